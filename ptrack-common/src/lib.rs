//! # ptrack Common Library
//!
//! Shared code for the station scan tools including:
//! - Station (process type) and scan mode definitions
//! - Code normalization and ordered deduplication
//! - Two-phase task model (claim / complete)
//! - Operator feedback events and the event bus
//! - Configuration loading and the local operator profile
//! - Time utilities

pub mod codes;
pub mod config;
pub mod error;
pub mod events;
pub mod process;
pub mod profile;
pub mod task;
pub mod time;

pub use codes::{dedupe_ordered, normalize_code};
pub use error::{Error, Result};
pub use process::{ProcessType, ScanMode};
