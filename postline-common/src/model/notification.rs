use crate::model::Id;
use crate::model::comment::CommentMarker;
use crate::model::post::PostMarker;
use crate::model::user::{Profile, UserMarker};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NotificationMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NotificationRecord {
    pub id: Id<NotificationMarker>,
    pub receiver_id: Id<UserMarker>,
    /// `None` when the sender's account no longer exists.
    pub sender: Option<Profile>,
    pub title: String,
    pub target: NotificationTarget,
    pub created_at: UtcDateTime,
}

/// What a notification points at; opening it navigates to this post.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTarget {
    pub post_id: Id<PostMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<Id<CommentMarker>>,
}

impl NotificationRecord {
    /// Creation date as shown in the notification list, e.g. `Oct 9`.
    #[must_use]
    pub fn display_date(&self) -> String {
        let month = self.created_at.month().to_string();
        let short_month = month.get(..3).unwrap_or(&month);
        format!("{short_month} {}", self.created_at.day())
    }
}
