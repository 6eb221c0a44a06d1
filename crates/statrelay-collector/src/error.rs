//! Collector error types.

use statrelay_metrics::MetricKind;
use statrelay_protocol::Action;
use thiserror::Error;

pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors raised while processing one message.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("message is not valid JSON: {0}")]
    Decode(serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid message: {0}")]
    InvalidValue(String),

    #[error("{action:?} is not supported by {kind} metrics")]
    UnsupportedAction { kind: MetricKind, action: Action },

    #[error("{type_name} collector rejected message: {reason}")]
    Aggregator { type_name: String, reason: String },
}

impl CollectorError {
    /// HTTP status reported to the sender of a failed message.
    pub fn status_code(&self) -> u16 {
        match self {
            CollectorError::Decode(_) | CollectorError::NotAnObject => 400,
            _ => 500,
        }
    }

    /// Errors that are logged and dropped instead of failing the request,
    /// so newer producers can talk to older collectors.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            CollectorError::UnknownKind(_)
                | CollectorError::MissingField(_)
                | CollectorError::UnsupportedAction { .. }
        )
    }
}
