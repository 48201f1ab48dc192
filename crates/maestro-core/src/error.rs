//! Error types for the maestro pipeline.

use thiserror::Error;

/// Result type alias using maestro's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for maestro operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Model generation failed (gateway/provider error)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Knowledge retrieval failed
    #[error("Search error: {0}")]
    Search(String),

    /// Memory load/persist failed
    #[error("Memory error: {0}")]
    Memory(String),

    /// Tool execution failed
    #[error("Tool error: {0}")]
    Tool(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Request was aborted by the caller
    #[error("Request aborted")]
    Aborted,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model timeout".to_string());
        assert_eq!(err.to_string(), "Inference error: model timeout");
    }

    #[test]
    fn test_error_display_embedding() {
        let err = Error::Embedding("dimension mismatch".to_string());
        assert_eq!(err.to_string(), "Embedding error: dimension mismatch");
    }

    #[test]
    fn test_error_display_search() {
        let err = Error::Search("index unavailable".to_string());
        assert_eq!(err.to_string(), "Search error: index unavailable");
    }

    #[test]
    fn test_error_display_memory() {
        let err = Error::Memory("store unreachable".to_string());
        assert_eq!(err.to_string(), "Memory error: store unreachable");
    }

    #[test]
    fn test_error_display_tool() {
        let err = Error::Tool("unknown tool".to_string());
        assert_eq!(err.to_string(), "Tool error: unknown tool");
    }

    #[test]
    fn test_error_display_aborted() {
        assert_eq!(Error::Aborted.to_string(), "Request aborted");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
