use crate::model::Id;
use crate::model::post::PostMarker;
use crate::model::user::{Profile, UserMarker};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// Client-local identifier of a comment that the server has not confirmed yet.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PendingCommentId(u64);

impl PendingCommentId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Display for PendingCommentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pending-{}", self.0)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum CommentKey {
    Pending(PendingCommentId),
    Confirmed(Id<CommentMarker>),
}

impl Display for CommentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommentKey::Pending(id) => Display::fmt(id, f),
            CommentKey::Confirmed(id) => Display::fmt(id, f),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Comment {
    pub key: CommentKey,
    pub post_id: Id<PostMarker>,
    pub author_id: Id<UserMarker>,
    /// `None` when the author could not be resolved.
    pub author: Option<Profile>,
    pub text: String,
    pub created_at: UtcDateTime,
}

impl Comment {
    #[must_use]
    pub fn confirmed(raw: RawComment, author: Option<Profile>) -> Self {
        Self {
            key: CommentKey::Confirmed(raw.id),
            post_id: raw.post_id,
            author_id: raw.user_id,
            author,
            text: raw.text,
            created_at: raw.created_at,
        }
    }

    #[must_use]
    pub fn server_id(&self) -> Option<Id<CommentMarker>> {
        match self.key {
            CommentKey::Confirmed(id) => Some(id),
            CommentKey::Pending(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.key, CommentKey::Pending(_))
    }
}

/// A comment row as the server stores it, without any profile data.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct RawComment {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    pub user_id: Id<UserMarker>,
    pub text: String,
    pub created_at: UtcDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateComment {
    pub user_id: Id<UserMarker>,
    pub post_id: Id<PostMarker>,
    pub text: CommentText,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentText(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Comment text must not be empty")]
pub struct EmptyCommentTextError;

impl CommentText {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyCommentTextError> {
        let text = text.into();
        if text.trim().is_empty() {
            Err(EmptyCommentTextError)
        } else {
            Ok(Self(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for CommentText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentText::new(inner.clone())
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"CommentText"))
    }
}
