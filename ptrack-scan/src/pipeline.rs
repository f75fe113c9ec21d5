//! Single-scan submission
//!
//! One decoded code, one station entry. The service is the only source of
//! truth for whether the entry exists, so every outcome is decided from its
//! reply:
//!
//! - recorded (possibly after bootstrapping an unknown product)
//! - duplicate, resolved by who owns the existing entry
//! - failed
//!
//! Settle delays and feedback are the engine's business; this module only
//! does the network work and classifies the result.

use crate::api::{ProcessApi, SubmitRequest};
use crate::cache::ProductDetailCache;
use crate::error::ApiError;
use ptrack_common::ProcessType;
use tracing::{debug, info, warn};

/// Classified result of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Entry recorded; `created` when the product record was bootstrapped
    Recorded { created: bool },
    /// Entry already exists and was recorded by this operator
    DuplicateOwn,
    /// Entry already exists for someone else (or the owner is unknown)
    DuplicateOther { existing_employee: Option<String> },
    Failed { reason: String },
}

/// Who owns an existing station entry, from the operator's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Own,
    Other,
}

/// Compare the recorded employee with the operator
///
/// Whitespace anywhere and letter case are ignored. An unknown or blank name
/// on either side never counts as a match.
pub fn resolve_ownership(existing_employee: Option<&str>, operator: &str) -> Ownership {
    let existing = existing_employee.map(fold_name).unwrap_or_default();
    let operator = fold_name(operator);
    if !existing.is_empty() && existing == operator {
        Ownership::Own
    } else {
        Ownership::Other
    }
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Submit one station entry for `code`
///
/// An unknown product is retried exactly once with `createIfNotExists`.
pub async fn submit_single<A: ProcessApi + ?Sized>(
    api: &A,
    cache: &ProductDetailCache,
    code: &str,
    process: ProcessType,
    operator: &str,
) -> SubmitOutcome {
    let request = SubmitRequest::new(code, process, operator, ptrack_common::time::now());

    let response = match api.submit_process(&request).await {
        Ok(response) => Some(response),
        Err(ApiError::NotFound(_)) => None,
        Err(e) => {
            warn!(code = %code, error = %e, "Submission failed");
            return SubmitOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    let (response, created) = match response {
        Some(response) => (response, false),
        None => {
            info!(code = %code, "Product not found, resubmitting with create");
            match api.submit_process(&request.creating()).await {
                Ok(response) => (response, true),
                Err(e) => {
                    warn!(code = %code, error = %e, "Create submission failed");
                    return SubmitOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }
    };

    if response.success {
        info!(code = %code, process = %process, created, "Station entry recorded");
        return SubmitOutcome::Recorded { created };
    }

    if response.is_duplicate() {
        return resolve_duplicate(api, cache, code, process, operator).await;
    }

    let reason = response.reason();
    warn!(code = %code, reason = %reason, "Submission refused");
    SubmitOutcome::Failed { reason }
}

/// Look up who recorded the existing entry and classify the duplicate
///
/// A lookup failure resolves as someone else's entry.
async fn resolve_duplicate<A: ProcessApi + ?Sized>(
    api: &A,
    cache: &ProductDetailCache,
    code: &str,
    process: ProcessType,
    operator: &str,
) -> SubmitOutcome {
    let existing_employee = match existing_employee(api, cache, code, process).await {
        Some(name) => Some(name),
        None => {
            // A cached record may predate the entry the service just refused
            // to overwrite.
            cache.invalidate(code).await;
            existing_employee(api, cache, code, process).await
        }
    };

    match resolve_ownership(existing_employee.as_deref(), operator) {
        Ownership::Own => {
            debug!(code = %code, "Duplicate entry belongs to operator");
            SubmitOutcome::DuplicateOwn
        }
        Ownership::Other => {
            info!(
                code = %code,
                existing = existing_employee.as_deref().unwrap_or("unknown"),
                "Duplicate entry belongs to another employee"
            );
            SubmitOutcome::DuplicateOther { existing_employee }
        }
    }
}

async fn existing_employee<A: ProcessApi + ?Sized>(
    api: &A,
    cache: &ProductDetailCache,
    code: &str,
    process: ProcessType,
) -> Option<String> {
    cache
        .get(api, code)
        .await
        .and_then(|details| details.employee_for(process).map(str::to_string))
}
