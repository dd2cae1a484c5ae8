//! Internal error model for the remote lookup service.

/// Errors that can occur while talking to the lookup service.
///
/// `Clone` so that mocks can hand out the same error repeatedly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error {code}: {message}")]
    Service { code: i64, message: String },

    #[error("HTTP {0}")]
    Http(u16),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl LookupError {
    /// Build a network error from a reqwest failure.
    pub fn network(e: impl std::fmt::Display) -> Self {
        Self::Network(e.to_string())
    }
}
