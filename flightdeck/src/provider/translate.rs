//! Translation of raw provider errors into user-facing messages.
//!
//! Some provider messages are generic ("Polling failed with status code ...")
//! while the actual reason sits in the inner message. Rules recognise those
//! cases and surface the inner message instead.

use super::ProviderError;
use crate::errors::StepError;
use std::fmt::Debug;

/// A rule that may produce a better message for a provider error.
pub trait TranslationRule: Send + Sync + Debug {
    /// Returns the translated message if the rule matches.
    fn translate(&self, error: &ProviderError) -> Option<String>;
}

fn inner_if(
    error: &ProviderError,
    outer_marker: &str,
    inner_marker: &str,
) -> Option<String> {
    let inner = error.inner_message.as_deref()?;
    (error.message.contains(outer_marker) && inner.contains(inner_marker))
        .then(|| inner.to_string())
}

/// Batch account quota exhausted during a long-running create.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAccountQuotaRule;

impl BatchAccountQuotaRule {
    /// Marker in the top-level message.
    pub const POLLING_MESSAGE_MARKER: &'static str = "Polling failed with status code";
    /// Marker in the inner message.
    pub const BATCH_QUOTA_MESSAGE_MARKER: &'static str =
        "The regional Batch account quota for the specified subscription has been reached";
}

impl TranslationRule for BatchAccountQuotaRule {
    fn translate(&self, error: &ProviderError) -> Option<String> {
        inner_if(
            error,
            Self::POLLING_MESSAGE_MARKER,
            Self::BATCH_QUOTA_MESSAGE_MARKER,
        )
    }
}

/// Flexible Postgres offer restricted in the requested region.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexiblePostgresRegionRule;

impl FlexiblePostgresRegionRule {
    /// Marker in the top-level message.
    pub const LRO_MESSAGE_MARKER: &'static str = "Long running operation is Failed or Cancelled";
    /// Marker in the inner message.
    pub const REGION_RESTRICTED_MARKER: &'static str =
        "Subscriptions are restricted from provisioning in this region";
}

impl TranslationRule for FlexiblePostgresRegionRule {
    fn translate(&self, error: &ProviderError) -> Option<String> {
        inner_if(
            error,
            Self::LRO_MESSAGE_MARKER,
            Self::REGION_RESTRICTED_MARKER,
        )
    }
}

/// Ordered set of translation rules. The first match wins.
#[derive(Debug)]
pub struct ErrorTranslator {
    rules: Vec<Box<dyn TranslationRule>>,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(BatchAccountQuotaRule),
                Box::new(FlexiblePostgresRegionRule),
            ],
        }
    }
}

impl ErrorTranslator {
    /// Creates a translator with the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a translator with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl TranslationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Returns the user-facing message for an error.
    #[must_use]
    pub fn message_for(&self, error: &ProviderError) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.translate(error))
            .unwrap_or_else(|| error.message.clone())
    }

    /// Builds the permanent step error for a provider error, keeping the raw
    /// diagnostic info as the cause.
    #[must_use]
    pub fn to_step_error(&self, error: &ProviderError) -> StepError {
        let mut step_error =
            StepError::permanent(self.message_for(error)).with_cause(error.error_info());
        if let Some(status) = error.http_status.filter(|s| *s >= 400) {
            step_error = step_error.with_status_code(status);
        }
        step_error
    }
}
