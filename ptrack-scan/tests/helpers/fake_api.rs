//! Scripted in-process ProcessApi
//!
//! Each endpoint pops its next scripted reply; with nothing scripted it falls
//! back to a plain default (submit succeeds, batch succeeds for every code,
//! claim/complete fail). Every call is recorded.

use async_trait::async_trait;
use ptrack_common::ProcessType;
use ptrack_scan::api::{
    BatchItemResult, BatchSubmitRequest, ClaimResponse, CompleteResponse, ProductDetails,
    SubmitRequest, SubmitResponse, TaskRequest,
};
use ptrack_scan::{ApiError, ApiResult, ProcessApi};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Submit(SubmitRequest),
    Batch(BatchSubmitRequest),
    Claim(TaskRequest),
    Complete(TaskRequest),
    Details(String),
}

#[derive(Default)]
pub struct FakeApi {
    submits: Mutex<VecDeque<ApiResult<SubmitResponse>>>,
    batches: Mutex<VecDeque<ApiResult<Vec<BatchItemResult>>>>,
    claims: Mutex<VecDeque<ApiResult<ClaimResponse>>>,
    completions: Mutex<VecDeque<ApiResult<CompleteResponse>>>,
    details: Mutex<HashMap<String, ProductDetails>>,
    calls: Mutex<Vec<Call>>,
    /// When set, submit and batch calls wait for a permit
    gate: Option<Semaphore>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions block until [`release`](Self::release) is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn script_submit(&self, reply: ApiResult<SubmitResponse>) -> &Self {
        self.submits.lock().unwrap().push_back(reply);
        self
    }

    pub fn script_batch(&self, reply: ApiResult<Vec<BatchItemResult>>) -> &Self {
        self.batches.lock().unwrap().push_back(reply);
        self
    }

    pub fn script_claim(&self, reply: ApiResult<ClaimResponse>) -> &Self {
        self.claims.lock().unwrap().push_back(reply);
        self
    }

    pub fn script_complete(&self, reply: ApiResult<CompleteResponse>) -> &Self {
        self.completions.lock().unwrap().push_back(reply);
        self
    }

    /// Product record with `employee` in the station's employee column
    pub fn put_record(&self, code: &str, process: ProcessType, employee: Option<&str>) {
        let mut fields = json!({ "产品编码": code, "产品型号": "Y2-132" });
        if let Some(name) = employee {
            fields[process.employee_field()] = Value::String(name.to_string());
        }
        let details: ProductDetails = serde_json::from_value(fields).unwrap();
        self.details.lock().unwrap().insert(code.to_string(), details);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> Vec<SubmitRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn detail_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Details(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

pub fn claim_success(min_work_minutes: u32, can_complete_at: &str) -> ClaimResponse {
    serde_json::from_value(json!({
        "status": "success",
        "product_model": "Y2-132",
        "min_work_minutes": min_work_minutes,
        "can_complete_at": can_complete_at,
    }))
    .unwrap()
}

pub fn claim_status(status: &str) -> ClaimResponse {
    serde_json::from_value(json!({ "status": status })).unwrap()
}

/// 2xx claim reply that was not granted, with the service's explanation
pub fn claim_refused(status: &str, detail: &str) -> ClaimResponse {
    serde_json::from_value(json!({ "status": status, "detail": detail })).unwrap()
}

pub fn completed(duration_minutes: f64) -> CompleteResponse {
    serde_json::from_value(json!({
        "status": "success",
        "product_model": "Y2-132",
        "duration_minutes": duration_minutes,
    }))
    .unwrap()
}

pub fn rejected(status: u16, detail: &str) -> ApiError {
    ApiError::Rejected {
        status,
        detail: detail.to_string(),
    }
}

#[async_trait]
impl ProcessApi for FakeApi {
    async fn submit_process(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        self.record(Call::Submit(request.clone()));
        self.wait_gate().await;
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SubmitResponse::ok()))
    }

    async fn batch_submit(&self, request: &BatchSubmitRequest) -> ApiResult<Vec<BatchItemResult>> {
        self.record(Call::Batch(request.clone()));
        self.wait_gate().await;
        let scripted = self.batches.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(request
                .product_codes
                .iter()
                .map(|code| BatchItemResult {
                    code: code.clone(),
                    success: true,
                    error: None,
                })
                .collect())
        })
    }

    async fn claim_task(&self, request: &TaskRequest) -> ApiResult<ClaimResponse> {
        self.record(Call::Claim(request.clone()));
        self.claims
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("claim not scripted".into())))
    }

    async fn complete_task(&self, request: &TaskRequest) -> ApiResult<CompleteResponse> {
        self.record(Call::Complete(request.clone()));
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("complete not scripted".into())))
    }

    async fn product_details(&self, product_code: &str) -> ApiResult<Option<ProductDetails>> {
        self.record(Call::Details(product_code.to_string()));
        Ok(self.details.lock().unwrap().get(product_code).cloned())
    }
}
