//! Error types shared by the hierarchy and visibility crates

use thiserror::Error;

use crate::model::Id;

/// Failure reported by a hierarchy data source.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The backend could not execute the query.
    #[error("{query} query failed: {message}")]
    Backend { query: &'static str, message: String },

    /// The query referenced an id the backend does not know.
    #[error("{query} query references unknown id {id}")]
    UnknownId { query: &'static str, id: Id },
}

impl QueryError {
    pub fn backend(query: &'static str, message: impl Into<String>) -> Self {
        QueryError::Backend {
            query,
            message: message.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while loading or validating a scene document.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed scene document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("id {0} is declared more than once")]
    DuplicateId(Id),

    #[error("{owner} references unknown {kind} {id}")]
    UnknownReference {
        kind: &'static str,
        id: Id,
        owner: Id,
    },

    #[error("{kind} {id} is its own ancestor")]
    Cycle { kind: &'static str, id: Id },
}

/// Returned when a string is not a `0x`-prefixed hexadecimal id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid id `{input}`: {reason}")]
pub struct IdParseError {
    pub input: String,
    pub reason: String,
}
