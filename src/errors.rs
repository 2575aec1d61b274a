// src/errors.rs

use thiserror::Error;

/// Errors raised by the inference clients.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Configuration could not be read, written, or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote answered with a non-success status
    #[error("API returned error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An image could not be turned into a data URL
    #[error("Media error: {0}")]
    Media(String),

    /// The inference server returned something that is not a graph
    #[error("Graph error: {0}")]
    Graph(String),
}

impl InferenceError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        InferenceError::Config(msg.into())
    }

    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        InferenceError::Api {
            status,
            body: body.into(),
        }
    }

    pub fn media_error(msg: impl Into<String>) -> Self {
        InferenceError::Media(msg.into())
    }

    pub fn graph_error(msg: impl Into<String>) -> Self {
        InferenceError::Graph(msg.into())
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            InferenceError::api_error(401, "invalid key").to_string(),
            "API returned error: 401 - invalid key"
        );
        assert_eq!(
            InferenceError::graph_error("no nodes").to_string(),
            "Graph error: no nodes"
        );
    }

    #[test]
    fn test_json_error_converts() {
        fn parse(text: &str) -> InferenceResult<serde_json::Value> {
            Ok(serde_json::from_str(text)?)
        }

        let err = parse("{").unwrap_err();
        assert!(matches!(err, InferenceError::Json(_)));
        assert!(err.to_string().starts_with("JSON error: "));
    }
}
