//! Transport and upstream error types for authority calls.

/// Errors raised while driving the policy authority's REST APIs.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// The request could not be sent or the response could not be read.
    #[error("request to authority failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with a non-success status. The body is kept
    /// verbatim so callers can attach the authority's own detail.
    #[error("authority returned {status}: {body}")]
    Upstream {
        /// HTTP status code of the response.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response was 2xx but its body did not have the expected shape.
    #[error("unexpected authority response: {0}")]
    Decode(String),

    /// The configured resource-server client is not registered in the realm.
    #[error("client not registered in realm: {0}")]
    ClientNotFound(String),

    /// The client could not be constructed from the given settings.
    #[error("invalid authority configuration: {0}")]
    Configuration(String),
}

impl AuthorityError {
    /// Creates an `Upstream` error from a status code and raw body.
    #[must_use]
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// The upstream HTTP status, when the authority produced one.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Detail string in the `"{status}: {body}"` form surfaced to callers.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Upstream { status, body } => format!("{status}: {body}"),
            other => format!("{}: {}", other.upstream_status().unwrap_or(500), other),
        }
    }
}
