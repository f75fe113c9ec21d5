//! Task claim/complete engine
//!
//! Drives the two-phase protocol for claim-gated stations purely from scan
//! events against the same product code:
//!
//! 1. claim: `success` starts the work window; `already_claimed` by this
//!    operator falls through to a completion attempt; a claim held by someone
//!    else (409, or any reply whose detail names another claimant) ends the
//!    scan.
//! 2. complete: the service checks the minimum work time and either records
//!    the duration or explains how long is left.
//!
//! An unknown product (claim 404) goes through the ordinary single-scan
//! submission so the baseline record gets created. Nothing here retries on
//! its own; every retry is a new physical scan.

use crate::api::{is_claimed_by_other_detail, ClaimStatus, ProcessApi, TaskRequest};
use crate::cache::ProductDetailCache;
use crate::error::ApiError;
use crate::pipeline::{submit_single, SubmitOutcome};
use chrono::{DateTime, Utc};
use ptrack_common::task::{Task, TaskState};
use ptrack_common::ProcessType;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one scan at a claim-gated station
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Claimed {
        product_model: Option<String>,
        min_work_minutes: u32,
        can_complete_at: Option<DateTime<Utc>>,
    },
    Completed {
        product_model: Option<String>,
        duration_minutes: f64,
    },
    /// Completion refused with 400, the service's minimum-work-time gate;
    /// `detail` is the service's message
    TooEarly { detail: String },
    ClaimedByOther { detail: String },
    /// Claim endpoint did not know the product; ordinary submission used
    Bootstrapped(SubmitOutcome),
    Failed { reason: String },
}

/// Claim then (if needed) complete `code` for `operator`
pub async fn run_task_scan<A: ProcessApi + ?Sized>(
    api: &A,
    cache: &ProductDetailCache,
    code: &str,
    process: ProcessType,
    operator: &str,
) -> TaskOutcome {
    let request = TaskRequest {
        product_code: code.to_string(),
        employee_name: operator.to_string(),
        process_type: process,
    };

    match api.claim_task(&request).await {
        Ok(claim) => match claim.status {
            ClaimStatus::Success => {
                let can_complete_at = claim.can_complete_at();
                info!(
                    code = %code,
                    min_work_minutes = claim.min_work_minutes.unwrap_or(0),
                    "Task claimed"
                );
                TaskOutcome::Claimed {
                    product_model: claim.product_model,
                    min_work_minutes: claim.min_work_minutes.unwrap_or(0),
                    can_complete_at,
                }
            }
            ClaimStatus::AlreadyClaimed => {
                debug!(code = %code, "Already claimed by this operator, completing");
                complete(api, &request).await
            }
            ClaimStatus::Other => match claim.detail {
                Some(detail) if is_claimed_by_other_detail(&detail) => {
                    warn!(code = %code, detail = %detail, "Task claimed by another employee");
                    TaskOutcome::ClaimedByOther { detail }
                }
                detail => {
                    debug!(code = %code, detail = ?detail, "Claim not granted, trying completion");
                    complete(api, &request).await
                }
            },
        },
        Err(ApiError::NotFound(_)) => {
            info!(code = %code, "Unknown product at claim, creating baseline record");
            TaskOutcome::Bootstrapped(submit_single(api, cache, code, process, operator).await)
        }
        Err(ApiError::Conflict(detail)) => {
            warn!(code = %code, detail = %detail, "Task claimed by another employee");
            TaskOutcome::ClaimedByOther { detail }
        }
        Err(ApiError::Rejected { detail, .. }) => {
            // Claim refused for another reason (e.g. task already running):
            // the scan may be the finishing one.
            debug!(code = %code, detail = %detail, "Claim rejected, trying completion");
            complete(api, &request).await
        }
        Err(e) => {
            warn!(code = %code, error = %e, "Claim failed");
            TaskOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn complete<A: ProcessApi + ?Sized>(api: &A, request: &TaskRequest) -> TaskOutcome {
    match api.complete_task(request).await {
        Ok(done) => {
            let duration_minutes = done.duration_minutes.unwrap_or(0.0);
            info!(code = %request.product_code, duration_minutes, "Task completed");
            TaskOutcome::Completed {
                product_model: done.product_model,
                duration_minutes,
            }
        }
        Err(ApiError::Rejected { status: 400, detail }) => {
            info!(code = %request.product_code, detail = %detail, "Completion refused, too early");
            TaskOutcome::TooEarly { detail }
        }
        Err(ApiError::Rejected { status, detail }) => {
            warn!(code = %request.product_code, status, detail = %detail, "Completion refused");
            TaskOutcome::Failed { reason: detail }
        }
        Err(ApiError::Conflict(detail)) => TaskOutcome::ClaimedByOther { detail },
        Err(e) => {
            warn!(code = %request.product_code, error = %e, "Completion failed");
            TaskOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Tasks this session has seen, by product code
///
/// A local mirror only; the service stays authoritative.
#[derive(Debug, Clone, Default)]
pub struct TaskLedger {
    tasks: HashMap<String, Task>,
}

impl TaskLedger {
    pub fn get(&self, code: &str) -> Option<&Task> {
        self.tasks.get(code)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remaining wait for a claimed task, from the local mirror
    pub fn remaining(&self, code: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.tasks
            .get(code)
            .filter(|t| t.state == TaskState::Claimed)
            .map(|t| t.remaining(now))
    }

    /// Fold one outcome into the mirror
    pub fn record(&mut self, code: &str, operator: &str, outcome: &TaskOutcome, now: DateTime<Utc>) {
        match outcome {
            TaskOutcome::Claimed {
                min_work_minutes,
                can_complete_at,
                ..
            } => {
                // Derive the claim time from the service's gate so both agree
                let claimed_at = can_complete_at
                    .map(|at| at - chrono::Duration::minutes(i64::from(*min_work_minutes)))
                    .unwrap_or(now);
                self.tasks.insert(
                    code.to_string(),
                    Task::claimed(code, operator, claimed_at, *min_work_minutes),
                );
            }
            TaskOutcome::Completed { .. } => {
                let task = self
                    .tasks
                    .entry(code.to_string())
                    .or_insert_with(|| Task::unclaimed(code));
                task.state = TaskState::Completed;
                task.completed_at = Some(now);
            }
            TaskOutcome::ClaimedByOther { .. } => {
                let task = self
                    .tasks
                    .entry(code.to_string())
                    .or_insert_with(|| Task::unclaimed(code));
                task.state = TaskState::ClaimedByOther;
            }
            // Too early leaves the task claimed; the others say nothing new
            TaskOutcome::TooEarly { .. } | TaskOutcome::Bootstrapped(_) | TaskOutcome::Failed { .. } => {}
        }
    }
}
