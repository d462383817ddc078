//! Error types for building and dispatching mock responses.

/// Errors raised while building expectations or materializing responses.
///
/// A request that matches no expectation is not an error; see
/// [`DispatchResult::Unmatched`](crate::dispatcher::DispatchResult::Unmatched).
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("Invalid status code: {0} (expected 100-599)")]
    InvalidStatusCode(u16),

    #[error("No converter can encode a body for content type '{content_type}'")]
    UnresolvedConverter { content_type: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Failed to convert body for content type '{content_type}': {reason}")]
    Conversion {
        content_type: String,
        reason: String,
    },

    #[error("Template rendering failed: {0}")]
    Template(String),
}

pub type Result<T> = std::result::Result<T, MockError>;
