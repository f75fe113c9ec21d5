//! Process-record service interface
//!
//! The service owns the authoritative product records. The engine talks to it
//! through [`ProcessApi`] so the orchestration can be exercised against an
//! in-process fake as well as the real HTTP client ([`HttpProcessApi`]).

mod http;
mod types;

pub use http::HttpProcessApi;
pub use types::{
    is_claimed_by_other_detail, BatchItemResult, BatchSubmitRequest, ClaimResponse, ClaimStatus,
    CompleteResponse, ProductDetails, SubmitRequest, SubmitResponse, TaskRequest,
    DUPLICATE_RECORD_SENTINEL,
};

use crate::error::ApiResult;
use async_trait::async_trait;

/// Operations offered by the process-record service
#[async_trait]
pub trait ProcessApi: Send + Sync {
    /// Record one station entry for one product
    ///
    /// An unknown product yields `ApiError::NotFound`; a refused write (for
    /// example the duplicate sentinel) comes back as `Ok` with
    /// `success == false`.
    async fn submit_process(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse>;

    /// Record one station entry for many products; partial success expected
    async fn batch_submit(&self, request: &BatchSubmitRequest) -> ApiResult<Vec<BatchItemResult>>;

    /// First phase of a claim-gated station
    async fn claim_task(&self, request: &TaskRequest) -> ApiResult<ClaimResponse>;

    /// Second phase; refused before the minimum work time elapsed
    async fn complete_task(&self, request: &TaskRequest) -> ApiResult<CompleteResponse>;

    /// Fetch a product record, `None` when it does not exist
    async fn product_details(&self, product_code: &str) -> ApiResult<Option<ProductDetails>>;
}
