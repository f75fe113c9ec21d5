//! Two-phase task model (claim / complete)
//!
//! Some stations (embedding) are physically long operations. Recording a
//! single timestamp cannot express "started at T1, not done before
//! T1 + min minutes", so the work is split into a claim and a completion that
//! is gated on the minimum work time.
//!
//! ```text
//! Unclaimed ──claim──► Claimed ──complete (now ≥ can_complete_at)──► Completed
//!     │                   │
//!     │                   └── claim by another employee ─► (refused, state kept)
//!     ├── seen claimed by someone else ─► ClaimedByOther
//!     └── refused by the service ───────► Rejected
//! ```
//!
//! The service owns the real task records. [`Task::claim`] and
//! [`Task::complete`] state its rules (claimant check, minimum work time) and
//! back any in-process stand-in for it; the scan engine itself only mirrors
//! claims it was told about, through [`Task::claimed`] and
//! [`Task::remaining`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Unclaimed,
    Claimed,
    Completed,
    /// Terminal: another employee holds the claim
    ClaimedByOther,
    /// Terminal: the claim was refused
    Rejected,
}

/// Why a claim or completion was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task for {product_code} is already claimed by {claimant}")]
    ClaimedByOther { product_code: String, claimant: String },

    #[error("task for {product_code} is not claimed")]
    NotClaimed { product_code: String },

    #[error("task for {product_code} is already completed")]
    AlreadyCompleted { product_code: String },

    #[error("task for {product_code} was claimed by {claimant}, not {employee}")]
    NotClaimant {
        product_code: String,
        claimant: String,
        employee: String,
    },

    #[error("minimum work time not reached for {product_code}, {} remaining", crate::time::format_wait(*remaining))]
    TooEarly {
        product_code: String,
        remaining: Duration,
        can_complete_at: DateTime<Utc>,
    },
}

/// Result of a successful claim call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Fresh claim recorded
    Claimed,
    /// Same employee already holds the claim
    AlreadyClaimed,
}

/// Result of a successful completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: f64,
}

/// One product's task at a claim-gated station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub product_code: String,
    pub state: TaskState,
    pub employee_name: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub min_work_minutes: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// New unclaimed task
    pub fn unclaimed(product_code: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            state: TaskState::Unclaimed,
            employee_name: None,
            claimed_at: None,
            min_work_minutes: 0,
            completed_at: None,
        }
    }

    /// Task already claimed, as reported by the service
    pub fn claimed(
        product_code: impl Into<String>,
        employee_name: impl Into<String>,
        claimed_at: DateTime<Utc>,
        min_work_minutes: u32,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            state: TaskState::Claimed,
            employee_name: Some(employee_name.into()),
            claimed_at: Some(claimed_at),
            min_work_minutes,
            completed_at: None,
        }
    }

    /// Earliest instant at which completion is allowed
    pub fn can_complete_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_at
            .map(|at| at + ChronoDuration::minutes(i64::from(self.min_work_minutes)))
    }

    /// Time left before completion is allowed (zero once reached)
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.can_complete_at()
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TaskState::Completed | TaskState::ClaimedByOther | TaskState::Rejected
        )
    }

    /// Claim the task for `employee`
    pub fn claim(
        &mut self,
        employee: &str,
        now: DateTime<Utc>,
        min_work_minutes: u32,
    ) -> Result<ClaimOutcome, TaskError> {
        match self.state {
            TaskState::Unclaimed => {
                self.state = TaskState::Claimed;
                self.employee_name = Some(employee.to_string());
                self.claimed_at = Some(now);
                self.min_work_minutes = min_work_minutes;
                Ok(ClaimOutcome::Claimed)
            }
            TaskState::Claimed if self.is_claimant(employee) => Ok(ClaimOutcome::AlreadyClaimed),
            TaskState::Claimed | TaskState::ClaimedByOther => Err(TaskError::ClaimedByOther {
                product_code: self.product_code.clone(),
                claimant: self.employee_name.clone().unwrap_or_default(),
            }),
            TaskState::Completed | TaskState::Rejected => Err(TaskError::AlreadyCompleted {
                product_code: self.product_code.clone(),
            }),
        }
    }

    /// Complete the task; refused before `can_complete_at` or for another employee
    ///
    /// A refused completion leaves the task untouched.
    pub fn complete(&mut self, employee: &str, now: DateTime<Utc>) -> Result<Completion, TaskError> {
        match self.state {
            TaskState::Claimed => {}
            TaskState::Completed => {
                return Err(TaskError::AlreadyCompleted {
                    product_code: self.product_code.clone(),
                })
            }
            _ => {
                return Err(TaskError::NotClaimed {
                    product_code: self.product_code.clone(),
                })
            }
        }

        if !self.is_claimant(employee) {
            return Err(TaskError::NotClaimant {
                product_code: self.product_code.clone(),
                claimant: self.employee_name.clone().unwrap_or_default(),
                employee: employee.to_string(),
            });
        }

        let (claimed_at, can_complete_at) = match (self.claimed_at, self.can_complete_at()) {
            (Some(claimed_at), Some(can_complete_at)) => (claimed_at, can_complete_at),
            _ => {
                return Err(TaskError::NotClaimed {
                    product_code: self.product_code.clone(),
                })
            }
        };

        if now < can_complete_at {
            return Err(TaskError::TooEarly {
                product_code: self.product_code.clone(),
                remaining: self.remaining(now),
                can_complete_at,
            });
        }

        self.state = TaskState::Completed;
        self.completed_at = Some(now);
        let duration_minutes = (now - claimed_at).num_seconds() as f64 / 60.0;
        Ok(Completion {
            completed_at: now,
            duration_minutes: (duration_minutes * 10.0).round() / 10.0,
        })
    }

    fn is_claimant(&self, employee: &str) -> bool {
        self.employee_name.as_deref() == Some(employee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_claim_sets_completion_gate() {
        let mut task = Task::unclaimed("P-003");
        assert_eq!(task.claim("Li Wei", t0(), 30), Ok(ClaimOutcome::Claimed));
        assert_eq!(task.state, TaskState::Claimed);
        assert_eq!(task.can_complete_at(), Some(t0() + ChronoDuration::minutes(30)));
    }

    #[test]
    fn test_reclaim_by_same_employee_is_already_claimed() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 30).unwrap();
        assert_eq!(
            task.claim("Li Wei", t0() + ChronoDuration::minutes(1), 30),
            Ok(ClaimOutcome::AlreadyClaimed)
        );
        // Original claim time is kept
        assert_eq!(task.claimed_at, Some(t0()));
    }

    #[test]
    fn test_claim_by_other_employee_is_refused() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 30).unwrap();
        let err = task.claim("Zhang San", t0(), 30).unwrap_err();
        assert!(matches!(err, TaskError::ClaimedByOther { ref claimant, .. } if claimant == "Li Wei"));
        assert_eq!(task.employee_name.as_deref(), Some("Li Wei"));
    }

    #[test]
    fn test_complete_too_early_reports_remaining_and_keeps_state() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 30).unwrap();

        let err = task
            .complete("Li Wei", t0() + ChronoDuration::minutes(10))
            .unwrap_err();
        match err {
            TaskError::TooEarly { remaining, .. } => {
                assert_eq!(remaining, Duration::from_secs(20 * 60));
            }
            other => panic!("expected TooEarly, got {:?}", other),
        }
        assert_eq!(task.state, TaskState::Claimed);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_complete_after_gate_succeeds_with_duration() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 30).unwrap();

        let done = task
            .complete("Li Wei", t0() + ChronoDuration::minutes(30))
            .unwrap();
        assert_eq!(done.duration_minutes, 30.0);
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.is_terminal());
    }

    #[test]
    fn test_complete_by_non_claimant_is_refused() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 0).unwrap();
        let err = task.complete("Zhang San", t0()).unwrap_err();
        assert!(matches!(err, TaskError::NotClaimant { .. }));
        assert_eq!(task.state, TaskState::Claimed);
    }

    #[test]
    fn test_complete_unclaimed_is_refused() {
        let mut task = Task::unclaimed("P-003");
        assert!(matches!(
            task.complete("Li Wei", t0()),
            Err(TaskError::NotClaimed { .. })
        ));
    }

    #[test]
    fn test_zero_minimum_completes_immediately() {
        let mut task = Task::unclaimed("P-010");
        task.claim("Li Wei", t0(), 0).unwrap();
        assert_eq!(task.remaining(t0()), Duration::ZERO);
        assert!(task.complete("Li Wei", t0()).is_ok());
    }

    #[test]
    fn test_too_early_message_mentions_wait() {
        let mut task = Task::unclaimed("P-003");
        task.claim("Li Wei", t0(), 30).unwrap();
        let err = task.complete("Li Wei", t0() + ChronoDuration::minutes(10)).unwrap_err();
        assert!(err.to_string().contains("20 min 0 s"));
    }
}
