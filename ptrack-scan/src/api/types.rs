//! Wire types of the process-record service
//!
//! Field names follow the service: camelCase for the record endpoints,
//! snake_case for the task endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use ptrack_common::time::parse_server_time;
use ptrack_common::ProcessType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message the service returns when a station entry already exists
pub const DUPLICATE_RECORD_SENTINEL: &str = "该产品的该工序已存在数据，不能覆盖";

/// Whether a refusal detail names another employee holding the claim
pub fn is_claimed_by_other_detail(detail: &str) -> bool {
    detail.contains("已被") && detail.contains("领取")
}

/// Single station entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub product_code: String,
    pub process_type: ProcessType,
    pub employee_name: String,
    pub time_field: String,
    pub employee_field: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_if_not_exists: bool,
}

impl SubmitRequest {
    pub fn new(
        product_code: impl Into<String>,
        process_type: ProcessType,
        employee_name: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            process_type,
            employee_name: employee_name.into(),
            time_field: process_type.time_field().to_string(),
            employee_field: process_type.employee_field().to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            create_if_not_exists: false,
        }
    }

    /// Same entry, asking the service to bootstrap the product record
    pub fn creating(&self) -> Self {
        Self {
            create_if_not_exists: true,
            ..self.clone()
        }
    }
}

/// Outcome of a single submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SubmitResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            detail: None,
        }
    }

    /// The service refused because the station entry already exists
    ///
    /// Older endpoints put the message in `error`, newer ones in `detail`.
    pub fn is_duplicate(&self) -> bool {
        [&self.error, &self.detail]
            .into_iter()
            .flatten()
            .any(|msg| msg.contains(DUPLICATE_RECORD_SENTINEL))
    }

    /// Best human-readable reason for a refusal
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.detail.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Many station entries at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitRequest {
    pub product_codes: Vec<String>,
    pub process_type: ProcessType,
    pub employee_name: String,
}

/// Per-code result of a batch submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub code: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    #[serde(default)]
    pub results: Vec<BatchItemResult>,
}

/// Claim or complete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub product_code: String,
    pub employee_name: String,
    pub process_type: ProcessType,
}

/// Status field of a claim response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Success,
    AlreadyClaimed,
    #[serde(other)]
    Other,
}

/// Claim response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub status: ClaimStatus,
    #[serde(default)]
    pub product_model: Option<String>,
    #[serde(default)]
    pub min_work_minutes: Option<u32>,
    #[serde(default)]
    pub can_complete_at: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ClaimResponse {
    pub fn can_complete_at(&self) -> Option<DateTime<Utc>> {
        self.can_complete_at.as_deref().and_then(parse_server_time)
    }
}

/// Completion response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub product_model: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub min_required_minutes: Option<u32>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl CompleteResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

/// Error body used by the service for non-2xx replies
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => self.error.clone(),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailsEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Product record as returned by the detail endpoint
///
/// Records are wide rows keyed by the service's column names, so they are
/// kept as a JSON object rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductDetails {
    pub fields: Map<String, Value>,
}

impl ProductDetails {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Non-blank string value of a column
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Employee recorded for a station, if any
    pub fn employee_for(&self, process: ProcessType) -> Option<&str> {
        self.text(process.employee_field())
    }
}
