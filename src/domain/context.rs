//! Operation Context
//!
//! Carries the correlation id and origin of an operation. Passed explicitly
//! through every engine and pipeline call so log lines can be correlated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an operation entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSource {
    Http,
    Message,
    Internal,
}

/// Context for an operation, used for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for end-to-end tracing
    pub correlation_id: String,

    /// Entry point of the operation
    pub source: OperationSource,
}

impl OperationContext {
    /// Create a context with an existing correlation ID
    pub fn new(correlation_id: impl Into<String>, source: OperationSource) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            source,
        }
    }

    /// Create a context with a freshly generated correlation ID
    pub fn generate(source: OperationSource) -> Self {
        Self::new(Uuid::new_v4().to_string(), source)
    }

    /// Reuse the first non-blank candidate, otherwise generate a new ID
    pub fn resolve<'a, I>(candidates: I, source: OperationSource) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        candidates
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
            .map(|id| Self::new(id, source))
            .unwrap_or_else(|| Self::generate(source))
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::generate(OperationSource::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let a = OperationContext::generate(OperationSource::Http);
        let b = OperationContext::generate(OperationSource::Http);
        assert_ne!(a.correlation_id, b.correlation_id);
        assert!(Uuid::parse_str(&a.correlation_id).is_ok());
    }

    #[test]
    fn test_resolve_prefers_first_non_blank() {
        let ctx = OperationContext::resolve(
            [None, Some("   "), Some("abc-123"), Some("later")],
            OperationSource::Message,
        );
        assert_eq!(ctx.correlation_id, "abc-123");
        assert_eq!(ctx.source, OperationSource::Message);
    }

    #[test]
    fn test_resolve_generates_when_missing() {
        let ctx = OperationContext::resolve([None, Some("")], OperationSource::Message);
        assert!(Uuid::parse_str(&ctx.correlation_id).is_ok());
    }
}
