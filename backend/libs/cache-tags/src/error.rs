//! Error types for cache tag invalidation operations

use thiserror::Error;

/// Cache tag invalidation errors
#[derive(Error, Debug)]
pub enum CacheTagError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Message serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid message format received
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheTagError::InvalidMessage("bad tag".to_string());
        assert_eq!(err.to_string(), "Invalid message format: bad tag");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("not json");
        assert!(json_err.is_err());

        let err: CacheTagError = json_err.unwrap_err().into();
        assert!(matches!(err, CacheTagError::Serialization(_)));
    }
}
