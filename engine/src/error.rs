//! Error types for the fieldsync engine.

use crate::{CollectionName, MutationId};
use thiserror::Error;

/// All possible errors from the fieldsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Durable state
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Remote calls
    #[error("remote write failed: {0}")]
    Remote(String),

    #[error("attachment upload failed for '{field}': {reason}")]
    Attachment { field: String, reason: String },

    #[error("remote call timed out after {0} ms")]
    Timeout(u64),

    // Caller errors
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("mutation not found: {0}")]
    MutationNotFound(MutationId),

    #[error("document not found: {collection}/{doc_id}")]
    DocumentNotFound {
        collection: CollectionName,
        doc_id: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Remote(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MutationNotFound("m-1".into());
        assert_eq!(err.to_string(), "mutation not found: m-1");

        let err = Error::Timeout(1500);
        assert_eq!(err.to_string(), "remote call timed out after 1500 ms");

        let err = Error::Attachment {
            field: "signature".into(),
            reason: "connection reset".into(),
        };
        assert_eq!(
            err.to_string(),
            "attachment upload failed for 'signature': connection reset"
        );

        let err = Error::DocumentNotFound {
            collection: "jobs".into(),
            doc_id: "job-9".into(),
        };
        assert_eq!(err.to_string(), "document not found: jobs/job-9");
    }

    #[test]
    fn json_errors_become_serialization_errors() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
