//! Error types for DataGate Core

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Tenant resolution errors
    #[error("{0}")]
    Auth(#[from] AuthError),

    // Request validation errors
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(NotFound),

    #[error("{0}")]
    Conflict(#[from] Conflict),

    // Backend errors
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Unclassified backend failure, message surfaced verbatim
    #[error("{0}")]
    Backend(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a malformed request body
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::MalformedBody(message.into()))
    }

    /// Shorthand for a method the backend does not allow
    pub fn unsupported(method: impl Into<String>) -> Self {
        Error::Validation(ValidationError::UnsupportedMethod(method.into()))
    }

    /// Shorthand for an unclassified backend failure
    pub fn backend(err: impl fmt::Display) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<NotFound> for Error {
    fn from(value: NotFound) -> Self {
        Error::NotFound(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token segment in the request path
    #[error("Not authenticated client")]
    Missing,

    #[error("Invalid client token")]
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid request format: {0}")]
    MalformedBody(String),

    #[error("Method not supported: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// Target of update/delete is missing
    Record,
    /// Target of a read or array mutation is missing
    Document,
    /// Array element lookup failed during an `update` mutation
    Element { element: String, field: String },
    Table(String),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::Record => write!(f, "Item not found"),
            NotFound::Document => write!(f, "Document not found"),
            NotFound::Element { element, field } => {
                write!(f, "Element {} not found in {}", element, field)
            }
            NotFound::Table(name) => write!(f, "Table not found: {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    /// Insert rejected; lists every field already taken
    #[error("duplicate")]
    DuplicateFields(Vec<String>),

    /// Update rejected by the single `unique` option
    #[error("Duplicate entry for the unique field: {0}")]
    DuplicateUnique(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_contract() {
        assert_eq!(Error::from(AuthError::Missing).to_string(), "Not authenticated client");
        assert_eq!(Error::from(AuthError::Invalid).to_string(), "Invalid client token");
        assert_eq!(
            Error::from(Conflict::DuplicateFields(vec!["email".into()])).to_string(),
            "duplicate"
        );
        assert_eq!(Error::from(NotFound::Document).to_string(), "Document not found");
    }

    #[test]
    fn test_element_not_found_message() {
        let err = NotFound::Element {
            element: "\"a\"".to_string(),
            field: "tags".to_string(),
        };
        assert_eq!(err.to_string(), "Element \"a\" not found in tags");
    }

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = Error::backend("E11000 duplicate key error");
        assert_eq!(err.to_string(), "E11000 duplicate key error");
    }
}
