//! Outcome classification
//!
//! Maps whatever a downstream call produced (a response, a transport error, or
//! both) onto an [`ErrorCategory`]. The order of checks matters: cancellation
//! and timeouts win over everything, then connection failures, and status codes
//! are only consulted when no error path matched.

use crate::error::ErrorCategory;
use crate::outcome::{CallError, CallErrorKind, CallResponse};

/// Classify a call outcome. Total: every input yields exactly one category.
pub fn classify(response: Option<&CallResponse>, error: Option<&CallError>) -> ErrorCategory {
    if let Some(err) = error {
        match err.kind {
            CallErrorKind::Cancelled | CallErrorKind::TimedOut => return ErrorCategory::Timeout,
            CallErrorKind::Connect => return ErrorCategory::Network,
            CallErrorKind::Other => {}
        }
    }

    if let Some(resp) = response {
        return classify_status(resp.status);
    }

    if error.is_some() {
        ErrorCategory::Unknown
    } else {
        ErrorCategory::None
    }
}

/// Classify a `Result` as returned by a [`Downstream`](crate::invoker::Downstream)
pub fn classify_result(result: &Result<CallResponse, CallError>) -> ErrorCategory {
    match result {
        Ok(resp) => classify(Some(resp), None),
        Err(err) => classify(None, Some(err)),
    }
}

/// Map an HTTP status code to a category
pub fn classify_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        408 => ErrorCategory::Timeout,
        400 | 422 => ErrorCategory::Validation,
        s if s >= 500 => ErrorCategory::Transient,
        _ => ErrorCategory::None,
    }
}
