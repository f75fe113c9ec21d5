//! In-memory process-record service on 127.0.0.1:0
//!
//! Mirrors the service's wire behavior closely enough to exercise the real
//! reqwest client: camelCase record endpoints, snake_case task endpoints,
//! 404 for unknown products, the duplicate sentinel, and a claim/complete
//! gate driven by a clock the test controls.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ptrack_common::config::ApiConfig;
use ptrack_common::task::{Task, TaskError};
use ptrack_scan::api::{BatchSubmitRequest, SubmitRequest, TaskRequest, DUPLICATE_RECORD_SENTINEL};
use ptrack_scan::HttpProcessApi;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Reply = (StatusCode, Json<Value>);

#[derive(Default)]
struct BackendState {
    records: HashMap<String, Map<String, Value>>,
    tasks: HashMap<String, Task>,
    clock: Option<DateTime<Utc>>,
    min_work_minutes: u32,
    requests: usize,
}

impl BackendState {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(start_of_shift)
    }
}

fn start_of_shift() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap()
}

type Shared = Arc<Mutex<BackendState>>;

/// Handle to a running mock service
#[derive(Clone)]
pub struct MockBackend {
    pub base_url: String,
    state: Shared,
}

impl MockBackend {
    /// reqwest client pointed at this backend
    pub fn client(&self) -> HttpProcessApi {
        HttpProcessApi::new(&ApiConfig {
            base_url: self.base_url.clone(),
            request_timeout_ms: 5_000,
        })
        .unwrap()
    }

    pub fn seed_product(&self, code: &str) {
        let mut fields = Map::new();
        fields.insert("产品编码".into(), json!(code));
        fields.insert("产品型号".into(), json!("Y2-132"));
        self.state.lock().unwrap().records.insert(code.to_string(), fields);
    }

    pub fn set_field(&self, code: &str, field: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.records.get_mut(code) {
            record.insert(field.to_string(), json!(value));
        }
    }

    pub fn record(&self, code: &str) -> Option<Map<String, Value>> {
        self.state.lock().unwrap().records.get(code).cloned()
    }

    pub fn set_min_work_minutes(&self, minutes: u32) {
        self.state.lock().unwrap().min_work_minutes = minutes;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().now()
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut state = self.state.lock().unwrap();
        let next = state.now() + Duration::minutes(minutes);
        state.clock = Some(next);
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests
    }
}

/// Start a mock backend on an ephemeral port
pub async fn spawn_backend() -> MockBackend {
    let state: Shared = Arc::new(Mutex::new(BackendState::default()));
    let app = Router::new()
        .route("/api/updateProductProcess", post(update_process))
        .route("/api/batchUpdateProductProcess", post(batch_update))
        .route("/api/task/claim", post(claim_task))
        .route("/api/task/complete", post(complete_task))
        .route("/api/getProductDetails", get(product_details))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        base_url: format!("http://{}", addr),
        state,
    }
}

fn has_value(record: &Map<String, Value>, field: &str) -> bool {
    record
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

async fn update_process(State(state): State<Shared>, Json(req): Json<SubmitRequest>) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests += 1;

    if !state.records.contains_key(&req.product_code) {
        if !req.create_if_not_exists {
            return (StatusCode::NOT_FOUND, Json(json!({"detail": "产品不存在"})));
        }
        let mut fields = Map::new();
        fields.insert("产品编码".into(), json!(req.product_code));
        state.records.insert(req.product_code.clone(), fields);
    }

    let Some(record) = state.records.get_mut(&req.product_code) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "lost"})));
    };
    if has_value(record, &req.employee_field) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": DUPLICATE_RECORD_SENTINEL})),
        );
    }
    record.insert(req.employee_field.clone(), json!(req.employee_name));
    record.insert(req.time_field.clone(), json!(req.timestamp));
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn batch_update(State(state): State<Shared>, Json(req): Json<BatchSubmitRequest>) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests += 1;
    let now = state.now().to_rfc3339();
    let employee_field = req.process_type.employee_field();
    let time_field = req.process_type.time_field();

    let results: Vec<Value> = req
        .product_codes
        .iter()
        .map(|code| {
            let success = match state.records.get_mut(code) {
                Some(record) if !has_value(record, employee_field) => {
                    record.insert(employee_field.into(), json!(req.employee_name));
                    record.insert(time_field.into(), json!(now));
                    true
                }
                _ => false,
            };
            json!({"code": code, "success": success})
        })
        .collect();
    (StatusCode::OK, Json(json!({ "results": results })))
}

async fn claim_task(State(state): State<Shared>, Json(req): Json<TaskRequest>) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests += 1;
    if !state.records.contains_key(&req.product_code) {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "产品不存在"})));
    }

    let now = state.now();
    let min = state.min_work_minutes;
    let task = state
        .tasks
        .entry(req.product_code.clone())
        .or_insert_with(|| Task::unclaimed(req.product_code.clone()));

    match task.claim(&req.employee_name, now, min) {
        Ok(ptrack_common::task::ClaimOutcome::Claimed) => {
            let can_complete_at = task
                .can_complete_at()
                .map(|at| at.format("%Y-%m-%dT%H:%M:%S").to_string());
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "product_model": "Y2-132",
                    "min_work_minutes": task.min_work_minutes,
                    "can_complete_at": can_complete_at,
                })),
            )
        }
        Ok(ptrack_common::task::ClaimOutcome::AlreadyClaimed) => (
            StatusCode::OK,
            Json(json!({"status": "already_claimed", "product_model": "Y2-132"})),
        ),
        Err(TaskError::ClaimedByOther { claimant, .. }) => (
            StatusCode::CONFLICT,
            Json(json!({"detail": format!("该任务已被 {} 领取", claimant)})),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({"detail": e.to_string()}))),
    }
}

async fn complete_task(State(state): State<Shared>, Json(req): Json<TaskRequest>) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests += 1;
    let now = state.now();

    let Some(task) = state.tasks.get_mut(&req.product_code) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "任务未领取"})));
    };
    match task.complete(&req.employee_name, now) {
        Ok(done) => {
            let employee_field = req.process_type.employee_field();
            let time_field = req.process_type.time_field();
            if let Some(record) = state.records.get_mut(&req.product_code) {
                record.insert(employee_field.into(), json!(req.employee_name));
                record.insert(time_field.into(), json!(done.completed_at.to_rfc3339()));
            }
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "product_model": "Y2-132",
                    "duration_minutes": done.duration_minutes,
                })),
            )
        }
        Err(TaskError::TooEarly { remaining, .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "detail": format!("最少工作时间未到，还需等待 {} 分钟", remaining.as_secs().div_ceil(60))
            })),
        ),
        Err(TaskError::NotClaimant { claimant, .. }) => (
            StatusCode::CONFLICT,
            Json(json!({"detail": format!("该任务已被 {} 领取", claimant)})),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({"detail": e.to_string()}))),
    }
}

async fn product_details(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let mut state = state.lock().unwrap();
    state.requests += 1;
    let record = params
        .get("productCode")
        .and_then(|code| state.records.get(code))
        .cloned();
    match record {
        Some(record) => (StatusCode::OK, Json(json!({ "data": record }))),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "产品不存在"}))),
    }
}
