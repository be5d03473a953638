use crate::model::Id;
use crate::model::comment::Comment;
use crate::model::user::Profile;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Profile,
    pub body: Option<String>,
    /// Reference to an attached image or video, if any.
    pub media: Option<String>,
    pub created_at: UtcDateTime,
}

/// A post together with its comments, as returned by a full fetch.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostDetails {
    pub post: Post,
    pub comments: Vec<Comment>,
}
