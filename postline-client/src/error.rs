use postline_common::model::{Id, ModelValidationError, post::PostMarker};
use postline_common::service::ServiceError;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum StoreError {
    #[error("Post with id {0} was not found.")]
    NotFound(Id<PostMarker>),
    #[error("{0}")]
    Transport(#[from] ServiceError),
    #[error("The operation was superseded before it completed")]
    StaleCompletion,
    #[error("No post is loaded")]
    NotLoaded,
    #[error("A comment is already being sent")]
    PendingCommentExists,
    #[error(transparent)]
    InvalidComment(#[from] ModelValidationError),
}

impl StoreError {
    /// Whether the view should swallow this error instead of showing it.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, StoreError::StaleCompletion)
    }
}
