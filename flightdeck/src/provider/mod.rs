//! Provider-agnostic error boundary.
//!
//! Every error returned by a cloud provider is converted into a
//! `ProviderError` before a step classifies it. Steps never look at SDK
//! types directly.

mod translate;

pub use translate::{
    BatchAccountQuotaRule, ErrorTranslator, FlexiblePostgresRegionRule, TranslationRule,
};

use serde::{Deserialize, Serialize};

/// Well-known provider error codes.
pub mod codes {
    /// The resource already exists.
    pub const CONFLICT: &str = "Conflict";
    /// The resource exists but is busy with another operation.
    pub const OPERATION_NOT_ALLOWED: &str = "OperationNotAllowed";
    /// The resource does not exist.
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    /// Generic not-found code.
    pub const NOT_FOUND: &str = "NotFound";
}

/// Error codes that indicate a busy or briefly unavailable service.
const TRANSIENT_CODES: &[&str] = &[
    "TooManyRequests",
    "ServiceUnavailable",
    "InternalServerError",
    "GatewayTimeout",
    "RetryableError",
    "AnotherOperationInProgress",
    "OperationPreempted",
];

/// One entry of a provider error's detail list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Detail code.
    pub code: String,
    /// Detail message.
    pub message: String,
}

impl ErrorDetail {
    /// Creates a detail entry.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// An error reported by a cloud provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider error code, e.g. `"Conflict"`.
    pub code: String,
    /// HTTP status of the failed call, when known.
    #[serde(default)]
    pub http_status: Option<u16>,
    /// Top-level message.
    pub message: String,
    /// More specific message carried by the error body, if any.
    #[serde(default)]
    pub inner_message: Option<String>,
    /// Detail entries.
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

impl ProviderError {
    /// Creates a provider error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            http_status: None,
            message: message.into(),
            inner_message: None,
            details: Vec::new(),
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Sets the inner message.
    #[must_use]
    pub fn with_inner_message(mut self, message: impl Into<String>) -> Self {
        self.inner_message = Some(message.into());
        self
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.push(ErrorDetail::new(code, message));
        self
    }

    /// Lowercased error code, as used for matching.
    #[must_use]
    pub fn normalized_code(&self) -> String {
        self.code.to_ascii_lowercase()
    }

    /// The resource already exists or is busy with another operation.
    ///
    /// Conflict codes only count when no other status was reported, so a
    /// quota-style `OperationNotAllowed` (400/403) is not treated as a conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self.http_status {
            Some(409) => true,
            None => {
                self.code.eq_ignore_ascii_case(codes::CONFLICT)
                    || self.code.eq_ignore_ascii_case(codes::OPERATION_NOT_ALLOWED)
            }
            Some(_) => false,
        }
    }

    /// The resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.http_status == Some(404)
            || self.code.eq_ignore_ascii_case(codes::RESOURCE_NOT_FOUND)
            || self.code.eq_ignore_ascii_case(codes::NOT_FOUND)
    }

    /// Default transient predicate: throttling, server errors and busy codes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        if matches!(self.http_status, Some(429 | 500..=599)) {
            return true;
        }
        TRANSIENT_CODES
            .iter()
            .any(|c| self.code.eq_ignore_ascii_case(c))
    }

    /// Diagnostic description including code, inner message and details.
    #[must_use]
    pub fn error_info(&self) -> String {
        let mut info = format!(
            "ErrorMessage: {}; ErrorCode: {}; AdditionalMessage: {};",
            self.message,
            if self.code.is_empty() { "n/a" } else { &self.code },
            self.inner_message.as_deref().unwrap_or("n/a"),
        );
        if !self.details.is_empty() {
            let details = self
                .details
                .iter()
                .map(|d| format!("[code: {}, message: {}]", d.code, d.message))
                .collect::<Vec<_>>()
                .join(",");
            info.push_str(&format!("Details: {details};"));
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        assert!(ProviderError::new("Conflict", "exists").is_conflict());
        assert!(ProviderError::new("operationnotallowed", "busy").is_conflict());
        assert!(ProviderError::new("Other", "x").with_status(409).is_conflict());
        assert!(!ProviderError::new("BadRequest", "x").with_status(400).is_conflict());
    }

    #[test]
    fn test_operation_not_allowed_with_other_status_is_not_conflict() {
        let quota = ProviderError::new("OperationNotAllowed", "Quota exceeded").with_status(403);
        assert!(!quota.is_conflict());
        assert!(ProviderError::new("OperationNotAllowed", "busy")
            .with_status(409)
            .is_conflict());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(ProviderError::new("ResourceNotFound", "gone").is_not_found());
        assert!(ProviderError::new("x", "gone").with_status(404).is_not_found());
        assert!(!ProviderError::new("Conflict", "x").is_not_found());
    }

    #[test]
    fn test_transient_detection() {
        assert!(ProviderError::new("x", "busy").with_status(503).is_transient());
        assert!(ProviderError::new("x", "slow down").with_status(429).is_transient());
        assert!(ProviderError::new("AnotherOperationInProgress", "busy").is_transient());
        assert!(!ProviderError::new("InvalidParameter", "bad").with_status(400).is_transient());
    }

    #[test]
    fn test_error_info_format() {
        let err = ProviderError::new("QuotaExceeded", "Operation failed")
            .with_inner_message("Quota reached")
            .with_detail("Sub", "cores")
            .with_detail("Region", "eastus");

        assert_eq!(
            err.error_info(),
            "ErrorMessage: Operation failed; ErrorCode: QuotaExceeded; \
             AdditionalMessage: Quota reached;Details: [code: Sub, message: cores],\
             [code: Region, message: eastus];"
        );
    }

    #[test]
    fn test_error_info_without_inner_message() {
        let err = ProviderError::new("", "boom");
        assert_eq!(
            err.error_info(),
            "ErrorMessage: boom; ErrorCode: n/a; AdditionalMessage: n/a;"
        );
    }
}
