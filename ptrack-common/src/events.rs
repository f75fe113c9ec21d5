//! Operator feedback events
//!
//! Every outcome of a scan is published as a [`ScanEvent`] on the
//! [`EventBus`]. The rendering side (toast, sound, blocking dialog) is a
//! subscriber; the engine never renders anything itself.

use crate::process::{ProcessType, ScanMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// How loudly a feedback item should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Info,
    Success,
    Warning,
    Error,
    /// Must be dismissed explicitly before scanning resumes
    Blocking,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Single scan recorded, back to station selection
    Recorded,
    /// Batch uploaded, back to station selection
    BatchUploaded,
    /// Operator stopped scanning
    Stopped,
}

/// Per-code line of a batch upload report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLine {
    pub code: String,
    pub success: bool,
}

/// Feedback produced by the scan engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanFeedback {
    SessionStarted {
        process: ProcessType,
        mode: ScanMode,
    },
    /// A decode was accepted for processing
    Recognized { code: String },
    /// Station entry recorded (`created` when the product record was bootstrapped)
    Recorded {
        code: String,
        process: ProcessType,
        created: bool,
    },
    /// Entry already exists and belongs to the current operator
    AlreadyRecordedBySelf { code: String, process: ProcessType },
    /// Entry already exists for someone else; this scan is not credited
    DuplicateOther {
        code: String,
        process: ProcessType,
        existing_employee: Option<String>,
    },
    SubmitFailed { code: String, reason: String },
    Queued { code: String, position: usize },
    AlreadyQueued { code: String },
    NothingToUpload,
    UploadStarted { count: usize },
    BatchUploaded {
        succeeded: usize,
        failed: usize,
        lines: Vec<BatchLine>,
    },
    TaskClaimed {
        code: String,
        product_model: Option<String>,
        min_work_minutes: u32,
        can_complete_at: Option<DateTime<Utc>>,
    },
    TaskCompleted {
        code: String,
        product_model: Option<String>,
        duration_minutes: f64,
    },
    /// Completion attempted before the minimum work time elapsed
    TaskTooEarly {
        code: String,
        detail: String,
        remaining_secs: Option<u64>,
    },
    TaskClaimedByOther { code: String, detail: String },
    ProductDetails {
        code: String,
        details: serde_json::Map<String, serde_json::Value>,
    },
    ProductNotFound { code: String },
    SessionEnded { reason: ExitReason },
}

impl ScanFeedback {
    /// Presentation level for this feedback
    pub fn level(&self) -> FeedbackLevel {
        match self {
            ScanFeedback::SessionStarted { .. }
            | ScanFeedback::Recognized { .. }
            | ScanFeedback::UploadStarted { .. }
            | ScanFeedback::ProductDetails { .. }
            | ScanFeedback::SessionEnded { .. } => FeedbackLevel::Info,
            ScanFeedback::Recorded { .. }
            | ScanFeedback::Queued { .. }
            | ScanFeedback::TaskClaimed { .. }
            | ScanFeedback::TaskCompleted { .. } => FeedbackLevel::Success,
            ScanFeedback::AlreadyRecordedBySelf { .. }
            | ScanFeedback::AlreadyQueued { .. }
            | ScanFeedback::NothingToUpload
            | ScanFeedback::TaskTooEarly { .. }
            | ScanFeedback::ProductNotFound { .. } => FeedbackLevel::Warning,
            ScanFeedback::BatchUploaded { succeeded, failed, .. } => match (succeeded, failed) {
                (_, 0) => FeedbackLevel::Success,
                (0, _) => FeedbackLevel::Error,
                _ => FeedbackLevel::Warning,
            },
            ScanFeedback::SubmitFailed { .. } | ScanFeedback::TaskClaimedByOther { .. } => {
                FeedbackLevel::Error
            }
            ScanFeedback::DuplicateOther { .. } => FeedbackLevel::Blocking,
        }
    }
}

impl fmt::Display for ScanFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFeedback::SessionStarted { process, mode } => {
                write!(f, "Scanning {} ({} mode)", process, mode)
            }
            ScanFeedback::Recognized { code } => write!(f, "Recognized: {}", code),
            ScanFeedback::Recorded { code, process, created } => {
                write!(f, "{} recorded: {}", process, code)?;
                if *created {
                    write!(f, " (new product)")?;
                }
                Ok(())
            }
            ScanFeedback::AlreadyRecordedBySelf { code, process } => {
                write!(f, "{} for {} was already recorded by you", process, code)
            }
            ScanFeedback::DuplicateOther { code, process, existing_employee } => {
                write!(f, "{} for {} already has a record", process, code)?;
                if let Some(name) = existing_employee {
                    write!(f, " by {}", name)?;
                }
                write!(f, ". This scan will NOT be credited to your account.")
            }
            ScanFeedback::SubmitFailed { code, reason } => {
                write!(f, "Update failed for {}: {}. Please rescan.", code, reason)
            }
            ScanFeedback::Queued { code, position } => {
                write!(f, "Queued #{}: {}", position, code)
            }
            ScanFeedback::AlreadyQueued { code } => write!(f, "{} is already in the queue", code),
            ScanFeedback::NothingToUpload => write!(f, "Nothing to upload"),
            ScanFeedback::UploadStarted { count } => write!(f, "Uploading {} codes...", count),
            ScanFeedback::BatchUploaded { succeeded, failed, .. } => match (succeeded, failed) {
                (n, 0) => write!(f, "All {} products updated", n),
                (0, _) => write!(f, "All products failed to update"),
                (ok, bad) => write!(f, "{} products updated, {} failed", ok, bad),
            },
            ScanFeedback::TaskClaimed { code, product_model, min_work_minutes, can_complete_at } => {
                write!(f, "Task claimed: {}", code)?;
                if let Some(model) = product_model {
                    write!(f, " (model {})", model)?;
                }
                if *min_work_minutes > 0 {
                    write!(f, ". Minimum work time {} min", min_work_minutes)?;
                    if let Some(at) = can_complete_at {
                        write!(f, ", scan again after {}", at.format("%H:%M:%S"))?;
                    }
                } else {
                    write!(f, ". No time limit, scan again when finished")?;
                }
                Ok(())
            }
            ScanFeedback::TaskCompleted { code, product_model, duration_minutes } => {
                write!(f, "Task completed: {}", code)?;
                if let Some(model) = product_model {
                    write!(f, " (model {})", model)?;
                }
                write!(f, " in {} min", duration_minutes)
            }
            ScanFeedback::TaskTooEarly { detail, .. } => write!(f, "{}", detail),
            ScanFeedback::TaskClaimedByOther { detail, .. } => write!(f, "{}", detail),
            ScanFeedback::ProductDetails { code, details } => {
                write!(f, "Product {} ({} fields)", code, details.len())
            }
            ScanFeedback::ProductNotFound { code } => write!(f, "Product {} not found", code),
            ScanFeedback::SessionEnded { reason } => write!(f, "Session ended ({:?})", reason),
        }
    }
}

/// Feedback item stamped with its session and time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub feedback: ScanFeedback,
}

/// Broadcast bus for scan events
///
/// Lossy by nature: events emitted with no subscriber are dropped, and slow
/// subscribers miss events once the channel capacity is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
