//! Contracts of the backend collaborators the client talks to.
//!
//! A failed call carries the backend's message. "Not found" is not a failure:
//! lookups return `Ok(None)` for absent records.

use crate::model::Id;
use crate::model::comment::{CommentMarker, CreateComment, RawComment};
use crate::model::notification::NotificationRecord;
use crate::model::post::{PostDetails, PostMarker};
use crate::model::user::{Profile, UserMarker};
use std::future::Future;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum FeedError {
    #[error("Subscribing to the change feed failed: {0}")]
    Handshake(String),
    #[error("The change feed broke off: {0}")]
    Stream(String),
}

pub trait PostService: Send + Sync + 'static {
    fn fetch_post_details(
        &self,
        post_id: Id<PostMarker>,
    ) -> impl Future<Output = ServiceResult<Option<PostDetails>>> + Send;

    fn create_comment(
        &self,
        comment: &CreateComment,
    ) -> impl Future<Output = ServiceResult<RawComment>> + Send;

    /// Removing a comment that does not exist succeeds.
    fn remove_comment(
        &self,
        comment_id: Id<CommentMarker>,
    ) -> impl Future<Output = ServiceResult<()>> + Send;
}

pub trait UserService: Send + Sync + 'static {
    fn get_user_data(
        &self,
        user_id: Id<UserMarker>,
    ) -> impl Future<Output = ServiceResult<Option<Profile>>> + Send;
}

pub trait NotificationService: Send + Sync + 'static {
    fn fetch_notifications(
        &self,
        user_id: Id<UserMarker>,
    ) -> impl Future<Output = ServiceResult<Vec<NotificationRecord>>> + Send;
}

/// Server-pushed stream of comment inserts, filtered by post on the server side.
pub trait ChangeFeed: Send + Sync + 'static {
    type Subscription: CommentSubscription;

    fn subscribe(
        &self,
        post_id: Id<PostMarker>,
    ) -> impl Future<Output = Result<Self::Subscription, FeedError>> + Send;
}

pub trait CommentSubscription: Send + 'static {
    /// Next inserted row in commit order, or `None` once the feed has ended.
    fn next_insert(&mut self)
    -> impl Future<Output = Option<Result<RawComment, FeedError>>> + Send;

    fn unsubscribe(self) -> impl Future<Output = ()> + Send;
}
