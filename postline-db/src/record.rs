use postline_common::model::Id;
use postline_common::model::comment::{Comment, CommentKey, CommentMarker, RawComment};
use postline_common::model::notification::{NotificationRecord, NotificationTarget};
use postline_common::model::post::{Post, PostMarker};
use postline_common::model::user::Profile;
use serde::Deserialize;
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum DbDataError {
    #[error("Notification data is not a valid target: {0}")]
    NotificationTarget(#[source] serde_json::Error),
    #[error("Comment notification payload could not be decoded: {0}")]
    CommentPayload(#[source] serde_json::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct UserRecord {
    pub user_id: i64,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct FullPostRecord {
    pub post_id: i64,
    pub body: Option<String>,
    pub file: Option<String>,
    pub created_at: OffsetDateTime,
    pub user_id: i64,
    pub name: String,
    pub image: Option<String>,
}

/// Comment joined with its author; the author columns are null for deleted accounts.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct FullCommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct CommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct FullNotificationRecord {
    pub notification_id: i64,
    pub receiver_id: i64,
    pub title: String,
    pub data: String,
    pub created_at: OffsetDateTime,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    pub sender_image: Option<String>,
}

/// Ids of an inserted comment as published by the insert trigger.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CommentPayload {
    pub id: i64,
    pub post_id: i64,
}

impl CommentPayload {
    pub fn parse(payload: &str) -> Result<Self, DbDataError> {
        serde_json::from_str(payload).map_err(DbDataError::CommentPayload)
    }

    #[must_use]
    pub fn comment_id(self) -> Id<CommentMarker> {
        self.id.cast_unsigned().into()
    }

    #[must_use]
    pub fn post_id(self) -> Id<PostMarker> {
        self.post_id.cast_unsigned().into()
    }
}

fn profile(user_id: i64, name: String, image: Option<String>) -> Profile {
    Profile {
        id: user_id.cast_unsigned().into(),
        name,
        avatar: image,
    }
}

impl From<UserRecord> for Profile {
    fn from(value: UserRecord) -> Self {
        profile(value.user_id, value.name, value.image)
    }
}

impl From<FullPostRecord> for Post {
    fn from(value: FullPostRecord) -> Self {
        Self {
            id: value.post_id.cast_unsigned().into(),
            author: profile(value.user_id, value.name, value.image),
            body: value.body,
            media: value.file,
            created_at: value.created_at.to_utc(),
        }
    }
}

impl From<FullCommentRecord> for Comment {
    fn from(value: FullCommentRecord) -> Self {
        let author = value
            .name
            .map(|name| profile(value.user_id, name, value.image));

        Self {
            key: CommentKey::Confirmed(value.comment_id.cast_unsigned().into()),
            post_id: value.post_id.cast_unsigned().into(),
            author_id: value.user_id.cast_unsigned().into(),
            author,
            text: value.text,
            created_at: value.created_at.to_utc(),
        }
    }
}

impl From<CommentRecord> for RawComment {
    fn from(value: CommentRecord) -> Self {
        Self {
            id: value.comment_id.cast_unsigned().into(),
            post_id: value.post_id.cast_unsigned().into(),
            user_id: value.user_id.cast_unsigned().into(),
            text: value.text,
            created_at: value.created_at.to_utc(),
        }
    }
}

impl TryFrom<FullNotificationRecord> for NotificationRecord {
    type Error = DbDataError;

    fn try_from(value: FullNotificationRecord) -> Result<Self, Self::Error> {
        let target: NotificationTarget =
            serde_json::from_str(&value.data).map_err(DbDataError::NotificationTarget)?;
        let sender = value
            .sender_id
            .zip(value.sender_name)
            .map(|(sender_id, name)| profile(sender_id, name, value.sender_image));

        Ok(Self {
            id: value.notification_id.cast_unsigned().into(),
            receiver_id: value.receiver_id.cast_unsigned().into(),
            sender,
            title: value.title,
            target,
            created_at: value.created_at.to_utc(),
        })
    }
}
