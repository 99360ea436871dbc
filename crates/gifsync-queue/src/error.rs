//! Queue error types.

use gifsync_models::ParseJobStateError;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt job record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error(transparent)]
    State(#[from] ParseJobStateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn broker_unavailable(msg: impl Into<String>) -> Self {
        Self::BrokerUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn corrupt_record(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the broker could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            QueueError::BrokerUnavailable(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_refusal()
                    || e.is_connection_dropped()
                    || e.is_timeout()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(QueueError::broker_unavailable("refused").is_unavailable());
        assert!(!QueueError::config("bad url").is_unavailable());
        assert!(!QueueError::corrupt_record("a", "no payload").is_unavailable());
        assert!(!QueueError::from(ParseJobStateError("deferred".into())).is_unavailable());
    }
}
