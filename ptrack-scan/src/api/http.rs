//! HTTP client for the process-record service
//!
//! Endpoints:
//! - `POST /api/updateProductProcess`
//! - `POST /api/batchUpdateProductProcess`
//! - `POST /api/task/claim`
//! - `POST /api/task/complete`
//! - `GET  /api/getProductDetails?productCode=...`

use super::types::{
    is_claimed_by_other_detail, BatchItemResult, BatchResponse, BatchSubmitRequest, ClaimResponse,
    CompleteResponse, DetailsEnvelope, ErrorBody, ProductDetails, SubmitRequest, SubmitResponse,
    TaskRequest,
};
use super::ProcessApi;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use ptrack_common::config::ApiConfig;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("ptrack-scan/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`ProcessApi`]
#[derive(Debug, Clone)]
pub struct HttpProcessApi {
    http_client: Client,
    base_url: String,
}

impl HttpProcessApi {
    /// Create a client for the configured service
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Setup(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-2xx task endpoint reply to an error
    async fn task_error(response: Response) -> ApiError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let detail = body
            .message()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(detail),
            StatusCode::CONFLICT => ApiError::Conflict(detail),
            _ if is_claimed_by_other_detail(&detail) => ApiError::Conflict(detail),
            _ => ApiError::Rejected {
                status: status.as_u16(),
                detail,
            },
        }
    }

    async fn post_task<T: DeserializeOwned>(&self, path: &str, request: &TaskRequest) -> ApiResult<T> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::task_error(response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProcessApi for HttpProcessApi {
    async fn submit_process(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        debug!(
            code = %request.product_code,
            process = %request.process_type,
            create = request.create_if_not_exists,
            "Submitting station entry"
        );

        let response = self
            .http_client
            .post(self.url("/api/updateProductProcess"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(request.product_code.clone()));
        }

        // Refusals (e.g. 400 with the duplicate sentinel) still carry a
        // SubmitResponse body, so parse regardless of status.
        let text = response.text().await?;
        match serde_json::from_str::<SubmitResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Ok(SubmitResponse::failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            ))),
            Err(e) => Err(ApiError::Parse(format!("Invalid submit response: {}", e))),
        }
    }

    async fn batch_submit(&self, request: &BatchSubmitRequest) -> ApiResult<Vec<BatchItemResult>> {
        debug!(
            count = request.product_codes.len(),
            process = %request.process_type,
            "Submitting batch"
        );

        let response = self
            .http_client
            .post(self.url("/api/batchUpdateProductProcess"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let detail = body.message().unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), detail = %detail, "Batch submission refused");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body: BatchResponse = response.json().await?;
        Ok(body.results)
    }

    async fn claim_task(&self, request: &TaskRequest) -> ApiResult<ClaimResponse> {
        debug!(code = %request.product_code, "Claiming task");
        self.post_task("/api/task/claim", request).await
    }

    async fn complete_task(&self, request: &TaskRequest) -> ApiResult<CompleteResponse> {
        debug!(code = %request.product_code, "Completing task");
        let response: CompleteResponse = self.post_task("/api/task/complete", request).await?;
        if !response.is_success() {
            // 200 with a non-success status still means "not completed"
            return Err(ApiError::Rejected {
                status: StatusCode::OK.as_u16(),
                detail: response
                    .detail
                    .unwrap_or_else(|| "completion refused".to_string()),
            });
        }
        Ok(response)
    }

    async fn product_details(&self, product_code: &str) -> ApiResult<Option<ProductDetails>> {
        let response = self
            .http_client
            .get(self.url("/api/getProductDetails"))
            .query(&[("productCode", product_code)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                detail: format!("product lookup failed for {}", product_code),
            });
        }

        let envelope: DetailsEnvelope = response.json().await?;
        match envelope.data {
            Some(Value::Object(fields)) => Ok(Some(ProductDetails::new(fields))),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(ApiError::Parse(format!(
                "product record is not an object: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ApiConfig {
            base_url: "http://10.0.0.5:8000/".to_string(),
            request_timeout_ms: 1000,
        };
        let api = HttpProcessApi::new(&config).unwrap();
        assert_eq!(api.base_url(), "http://10.0.0.5:8000");
        assert_eq!(api.url("/api/task/claim"), "http://10.0.0.5:8000/api/task/claim");
    }

    #[test]
    fn test_user_agent_names_crate() {
        assert!(USER_AGENT.starts_with("ptrack-scan/"));
    }
}
