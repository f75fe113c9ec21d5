//! ptrack-scan library interface
//!
//! Scan-intake and task-lifecycle engine for process stations. A decoded
//! barcode goes through the debouncer and the session's single-flight guard,
//! then becomes one of:
//!
//! - a single station entry ([`pipeline`])
//! - a queued code for a later batch upload ([`queue`])
//! - a claim or completion of a timed task ([`tasks`])
//! - a product detail lookup ([`cache`])
//!
//! [`engine::ScanEngine`] coordinates all of it; [`runner::run_session`]
//! drives an engine from operator input.

pub mod api;
pub mod cache;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod runner;
pub mod session;
pub mod tasks;

pub use crate::api::{HttpProcessApi, ProcessApi};
pub use crate::cache::ProductDetailCache;
pub use crate::engine::{Intake, IgnoreReason, JobOutcome, ScanEngine, ScanStep};
pub use crate::error::{ApiError, ApiResult, ScanError};
pub use crate::pipeline::{resolve_ownership, Ownership, SubmitOutcome};
pub use crate::runner::{run_session, OperatorInput};
pub use crate::tasks::TaskOutcome;
