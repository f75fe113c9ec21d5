//! Product detail cache
//!
//! Time-bounded, size-bounded map from product code to the last fetched
//! record. Eviction is by insertion order: refreshing an expired entry updates
//! it in place and does not move it to the back.
//!
//! Entries can be staler than a write that just completed; they are only
//! replaced once the TTL runs out.

use crate::api::{ProcessApi, ProductDetails};
use ptrack_common::config::CacheConfig;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: ProductDetails,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Codes in insertion order (oldest first)
    order: VecDeque<String>,
}

/// Shared product detail cache
#[derive(Debug)]
pub struct ProductDetailCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    capacity: usize,
}

impl ProductDetailCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.capacity)
    }

    /// Cached record if fresh, otherwise fetch and store it
    pub async fn get<A: ProcessApi + ?Sized>(&self, api: &A, code: &str) -> Option<ProductDetails> {
        self.get_at(api, code, Instant::now()).await
    }

    /// [`get`](Self::get) with an explicit clock
    ///
    /// The lock is not held across the fetch; two concurrent misses for the
    /// same code both fetch and the later one wins.
    pub async fn get_at<A: ProcessApi + ?Sized>(
        &self,
        api: &A,
        code: &str,
        now: Instant,
    ) -> Option<ProductDetails> {
        if let Some(hit) = self.lookup(code, now).await {
            debug!(code = %code, "Product detail cache hit");
            return Some(hit);
        }

        debug!(code = %code, "Product detail cache miss, fetching");
        let fetched = match api.product_details(code).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                debug!(code = %code, "Product not found");
                return None;
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Product detail fetch failed");
                return None;
            }
        };

        self.insert(code, fetched.clone(), now).await;
        Some(fetched)
    }

    /// Fresh entry without fetching
    pub async fn lookup(&self, code: &str, now: Instant) -> Option<ProductDetails> {
        let state = self.state.lock().await;
        state
            .entries
            .get(code)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.data.clone())
    }

    /// Store a record, evicting the oldest-inserted entry beyond capacity
    pub async fn insert(&self, code: &str, data: ProductDetails, now: Instant) {
        let mut state = self.state.lock().await;
        let entry = CacheEntry {
            data,
            fetched_at: now,
        };
        if state.entries.insert(code.to_string(), entry).is_none() {
            state.order.push_back(code.to_string());
        }

        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            debug!(code = %oldest, "Evicted oldest product detail entry");
        }
    }

    /// Drop one entry so the next read fetches fresh data
    pub async fn invalidate(&self, code: &str) {
        let mut state = self.state.lock().await;
        if state.entries.remove(code).is_some() {
            state.order.retain(|c| c != code);
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ProductDetailCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
