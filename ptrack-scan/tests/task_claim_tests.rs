//! Claim-phase branches of the embedding flow
//!
//! Scripted FakeApi; each test checks the outcome and which endpoints were hit.

mod helpers;

use helpers::fake_api::{
    claim_refused, claim_status, claim_success, completed, rejected, Call, FakeApi,
};
use helpers::{drain, engine_with, OPERATOR};
use ptrack_common::events::{FeedbackLevel, ScanFeedback};
use ptrack_common::{ProcessType, ScanMode};
use ptrack_scan::engine::{JobOutcome, ScanStep};
use ptrack_scan::{ApiError, ScanEngine, TaskOutcome};
use std::sync::Arc;
use tokio::time::Instant;

fn embedding(api: &Arc<FakeApi>) -> ScanEngine<FakeApi> {
    let mut engine = engine_with(api.clone(), OPERATOR);
    engine.start_session(ProcessType::Embedding, ScanMode::Single).unwrap();
    engine
}

fn endpoints(api: &FakeApi) -> Vec<&'static str> {
    api.calls()
        .iter()
        .map(|call| match call {
            Call::Submit(_) => "submit",
            Call::Batch(_) => "batch",
            Call::Claim(_) => "claim",
            Call::Complete(_) => "complete",
            Call::Details(_) => "details",
        })
        .collect()
}

async fn task_scan(engine: &mut ScanEngine<FakeApi>, code: &str) -> TaskOutcome {
    match engine.scan(code, Instant::now()).await {
        ScanStep::Applied(JobOutcome::Task(outcome)) => outcome,
        other => panic!("expected a task outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_claim_success_reports_work_window() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_success(30, "2025-05-06T08:30:00")));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-100").await;
    assert!(matches!(
        outcome,
        TaskOutcome::Claimed {
            min_work_minutes: 30,
            can_complete_at: Some(_),
            ..
        }
    ));
    assert_eq!(endpoints(&api), ["claim"]);
    match &api.calls()[0] {
        Call::Claim(request) => {
            assert_eq!(request.product_code, "P-100");
            assert_eq!(request.employee_name, OPERATOR);
            assert_eq!(request.process_type, ProcessType::Embedding);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_already_claimed_goes_on_to_complete() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_status("already_claimed")));
    api.script_complete(Ok(completed(42.0)));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-101").await;
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            product_model: Some("Y2-132".into()),
            duration_minutes: 42.0,
        }
    );
    assert_eq!(endpoints(&api), ["claim", "complete"]);
}

#[tokio::test]
async fn test_claim_naming_another_claimant_stops_without_completing() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_refused("failed", "该任务已被 张三 领取")));
    api.script_complete(Ok(completed(3.0)));
    let mut engine = embedding(&api);
    let mut rx = engine.events().subscribe();

    let outcome = task_scan(&mut engine, "P-102").await;
    assert_eq!(
        outcome,
        TaskOutcome::ClaimedByOther {
            detail: "该任务已被 张三 领取".into()
        }
    );
    assert_eq!(endpoints(&api), ["claim"]);

    let failure = drain(&mut rx)
        .into_iter()
        .find(|f| matches!(f, ScanFeedback::TaskClaimedByOther { .. }))
        .unwrap();
    assert_eq!(failure.level(), FeedbackLevel::Error);
}

#[tokio::test]
async fn test_unrecognized_claim_status_tries_completion() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_refused("in_progress", "任务进行中")));
    api.script_complete(Ok(completed(31.5)));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-103").await;
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));
    assert_eq!(endpoints(&api), ["claim", "complete"]);
}

#[tokio::test]
async fn test_rejected_claim_tries_completion() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Err(rejected(400, "任务已在进行中")));
    api.script_complete(Err(rejected(400, "最少工作时间未到，还需等待 12 分钟")));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-104").await;
    assert_eq!(
        outcome,
        TaskOutcome::TooEarly {
            detail: "最少工作时间未到，还需等待 12 分钟".into()
        }
    );
    assert_eq!(endpoints(&api), ["claim", "complete"]);
}

#[tokio::test]
async fn test_claim_transport_failure_is_not_retried() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Err(ApiError::Network("connection reset".into())));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-105").await;
    assert!(matches!(outcome, TaskOutcome::Failed { .. }));
    // No single-scan fallback and no completion attempt
    assert_eq!(endpoints(&api), ["claim"]);
}

#[tokio::test]
async fn test_completion_conflict_is_claimed_by_other() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_status("already_claimed")));
    api.script_complete(Err(ApiError::Conflict("该任务已被 张三 领取".into())));
    let mut engine = embedding(&api);

    let outcome = task_scan(&mut engine, "P-106").await;
    assert!(matches!(outcome, TaskOutcome::ClaimedByOther { .. }));
    assert_eq!(endpoints(&api), ["claim", "complete"]);
}

#[tokio::test]
async fn test_completion_refused_other_than_timing_is_a_failure() {
    let api = Arc::new(FakeApi::new());
    api.script_claim(Ok(claim_status("already_claimed")));
    api.script_complete(Err(rejected(500, "数据库错误")));
    let mut engine = embedding(&api);
    let mut rx = engine.events().subscribe();

    let outcome = task_scan(&mut engine, "P-107").await;
    assert_eq!(
        outcome,
        TaskOutcome::Failed {
            reason: "数据库错误".into()
        }
    );
    assert!(!drain(&mut rx)
        .iter()
        .any(|f| matches!(f, ScanFeedback::TaskTooEarly { .. })));
}
