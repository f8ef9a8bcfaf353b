//! Errors surfaced by visibility mutations

use arbor_core::QueryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisibilityError {
    /// Resolving the hierarchy behind the node failed; nothing past the failure was applied.
    #[error("failed to resolve hierarchy: {0}")]
    Query(#[from] QueryError),
}
