//! Test Helper Utilities
//!
//! Shared utilities for testing ptrack-scan

#![allow(dead_code)]

pub mod fake_api;
pub mod mock_backend;

use ptrack_common::config::ScanTimings;
use ptrack_common::events::{ScanEvent, ScanFeedback};
use ptrack_scan::{ProcessApi, ProductDetailCache, ScanEngine};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const OPERATOR: &str = "Li Wei";

/// Engine over `api` with default timings and a fresh cache
pub fn engine_with<A: ProcessApi + ?Sized>(api: Arc<A>, operator: &str) -> ScanEngine<A> {
    ScanEngine::new(
        api,
        Arc::new(ProductDetailCache::default()),
        operator,
        ScanTimings::default(),
        Default::default(),
    )
    .expect("operator is not blank")
}

/// Everything emitted so far, oldest first
pub fn drain(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanFeedback> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event.feedback);
    }
    out
}
