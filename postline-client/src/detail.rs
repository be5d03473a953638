//! The materialized post detail view and the merges applied to it.
//!
//! # Invariants
//! - Comments are ordered most recent first.
//! - No two comments share a server id.
//! - At most one comment is pending.
//! - A deleted server id never enters the sequence again.

use postline_common::model::Id;
use postline_common::model::comment::{Comment, CommentKey, CommentMarker, PendingCommentId};
use postline_common::model::post::{Post, PostDetails};
use postline_common::model::user::{Profile, UserMarker};
use postline_common::service::FeedError;
use std::collections::HashSet;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PostDetail {
    post: Post,
    comments: Vec<Comment>,
    deleted: HashSet<Id<CommentMarker>>,
    feed_error: Option<FeedError>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum PushOutcome {
    Inserted,
    ConfirmedPending(PendingCommentId),
    Duplicate,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ConfirmOutcome {
    Replaced,
    AlreadyPresent,
    Deleted,
    Gone,
}

impl PostDetail {
    #[must_use]
    pub fn new(details: PostDetails) -> Self {
        let PostDetails { post, mut comments } = details;

        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = HashSet::new();
        comments.retain(|comment| comment.server_id().is_none_or(|id| seen.insert(id)));

        Self {
            post,
            comments,
            deleted: HashSet::new(),
            feed_error: None,
        }
    }

    #[must_use]
    pub fn post(&self) -> &Post {
        &self.post
    }

    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.is_pending())
    }

    /// Set when the live comment feed failed; comments then only change
    /// through local actions until the post is loaded again.
    #[must_use]
    pub fn feed_error(&self) -> Option<&FeedError> {
        self.feed_error.as_ref()
    }

    /// Comment authors and the post's author may delete confirmed comments.
    #[must_use]
    pub fn can_delete(&self, comment: &Comment, viewer: Id<UserMarker>) -> bool {
        !comment.is_pending() && (comment.author_id == viewer || self.post.author.id == viewer)
    }

    #[must_use]
    pub fn contains(&self, comment_id: Id<CommentMarker>) -> bool {
        self.position_of(comment_id).is_some()
    }

    /// Profiles already present in the snapshot.
    pub(crate) fn known_profiles(&self) -> impl Iterator<Item = Profile> + '_ {
        std::iter::once(&self.post.author)
            .chain(self.comments.iter().filter_map(|comment| comment.author.as_ref()))
            .cloned()
    }

    pub(crate) fn merge_pushed(&mut self, mut comment: Comment) -> PushOutcome {
        if comment
            .server_id()
            .is_some_and(|id| self.contains(id) || self.deleted.contains(&id))
        {
            return PushOutcome::Duplicate;
        }

        let matching_pending = self
            .comments
            .iter()
            .enumerate()
            .find_map(|(index, pending)| match pending.key {
                CommentKey::Pending(pending_id)
                    if pending.author_id == comment.author_id && pending.text == comment.text =>
                {
                    Some((index, pending_id))
                }
                _ => None,
            });

        if let Some((index, pending_id)) = matching_pending {
            let pending = self.comments.remove(index);
            if comment.author.is_none() {
                comment.author = pending.author;
            }
            self.insert_by_time(comment);
            return PushOutcome::ConfirmedPending(pending_id);
        }

        self.insert_by_time(comment);
        PushOutcome::Inserted
    }

    pub(crate) fn insert_pending(&mut self, comment: Comment) {
        debug_assert!(comment.is_pending());
        debug_assert!(self.pending().is_none());
        self.comments.insert(0, comment);
    }

    pub(crate) fn confirm_pending(
        &mut self,
        pending_id: PendingCommentId,
        confirmed: Comment,
    ) -> ConfirmOutcome {
        let Some(server_id) = confirmed.server_id() else {
            return ConfirmOutcome::Gone;
        };
        let was_pending = self.discard_pending(pending_id);

        if self.deleted.contains(&server_id) {
            ConfirmOutcome::Deleted
        } else if self.contains(server_id) {
            ConfirmOutcome::AlreadyPresent
        } else if was_pending {
            self.insert_by_time(confirmed);
            ConfirmOutcome::Replaced
        } else {
            ConfirmOutcome::Gone
        }
    }

    pub(crate) fn discard_pending(&mut self, pending_id: PendingCommentId) -> bool {
        match self.position_of_pending(pending_id) {
            Some(index) => {
                self.comments.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops the comment and remembers its id, so later deliveries of the
    /// same row are ignored. Returns whether the comment was shown.
    pub(crate) fn remove(&mut self, comment_id: Id<CommentMarker>) -> bool {
        self.deleted.insert(comment_id);
        match self.position_of(comment_id) {
            Some(index) => {
                self.comments.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_feed_error(&mut self, error: FeedError) {
        self.feed_error = Some(error);
    }

    /// Inserts ahead of the first comment that is not newer, so a comment
    /// created at the same instant as another goes first.
    fn insert_by_time(&mut self, comment: Comment) {
        let index = self
            .comments
            .iter()
            .position(|existing| existing.created_at <= comment.created_at)
            .unwrap_or(self.comments.len());
        self.comments.insert(index, comment);
    }

    fn position_of(&self, comment_id: Id<CommentMarker>) -> Option<usize> {
        self.comments
            .iter()
            .position(|comment| comment.server_id() == Some(comment_id))
    }

    fn position_of_pending(&self, pending_id: PendingCommentId) -> Option<usize> {
        self.comments
            .iter()
            .position(|comment| comment.key == CommentKey::Pending(pending_id))
    }
}
