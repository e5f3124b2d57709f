//! Caller-facing error taxonomy.
//!
//! Every failure of a rule-management or confirmation operation maps to one
//! HTTP status plus a fixed message id and a detail string carrying the
//! authority's own answer (`"{status}: {body}"`). Mapping rules:
//!
//! - upstream network errors and 5xx answers -> 500,
//! - upstream 4xx answers -> the step's own caller status,
//! - local validation -> 400, raised before any authority call,
//! - domain not-found -> 404, raised only after an authority read.

use tradegate_authority::AuthorityError;

/// Errors surfaced to the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// A step of a flow failed against the authority.
    #[error("{message} ({status}): {detail}")]
    Step {
        /// Caller-facing HTTP status.
        status: u16,
        /// Fixed message id for the failed step.
        message: String,
        /// The authority's status and body, verbatim.
        detail: String,
    },

    /// The request was rejected locally, before any authority call.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested permission/policy/resource does not exist.
    #[error("{message}")]
    NotFound {
        /// Fixed message id for the missing object.
        message: String,
        /// Context from the authority read that came up empty.
        detail: String,
    },
}

impl AuthzError {
    /// Wraps an authority failure for one named step.
    ///
    /// `fallback` is the caller status used for upstream 4xx answers;
    /// network errors and 5xx answers always map to 500.
    #[must_use]
    pub fn step(message: impl Into<String>, fallback: u16, source: AuthorityError) -> Self {
        let status = match source.upstream_status() {
            Some(code) if code < 500 => fallback,
            _ => 500,
        };
        Self::Step {
            status,
            message: message.into(),
            detail: source.detail(),
        }
    }

    /// Creates a domain not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Step { status, .. } => *status,
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
        }
    }

    /// The fixed message id.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Step { message, .. } | Self::NotFound { message, .. } => message,
            Self::Validation(message) => message,
        }
    }

    /// The detail string (empty for local validation).
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Step { detail, .. } | Self::NotFound { detail, .. } => detail,
            Self::Validation(_) => "",
        }
    }
}
