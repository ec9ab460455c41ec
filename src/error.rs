use thiserror::Error;

/// Errors surfaced by detector construction and stream processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// The source ended before the seed window filled, so no statistics exist.
    #[error("source exhausted during warm-up: received {received} of {required} seed observations")]
    SourceExhausted { required: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, DetectorError>;

impl DetectorError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}
