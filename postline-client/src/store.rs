//! Live view of one post and its comments.
//!
//! The store merges three sources into a single [`PostDetailState`]: the
//! snapshot fetched by [`PostDetailStore::load`], comment inserts pushed by the
//! change feed, and the viewer's own comment submissions and deletions.
//!
//! # Invariants
//! - Every mutation happens under one lock and is published before the lock is
//!   released; the lock is never held across an await.
//! - Each `load` and `teardown` bumps the load generation. A completion that
//!   belongs to an older generation is discarded.
//! - A change feed channel is open exactly while the state is `Loaded`.

use crate::channel::{ChangeFeedChannel, ChangeFeedHandler};
use crate::detail::{ConfirmOutcome, PostDetail, PushOutcome};
use crate::error::{Result, StoreError};
use crate::resolver::UserProfileResolver;
use crate::session::Session;
use postline_common::model::comment::{
    Comment, CommentKey, CommentMarker, CommentText, CreateComment, PendingCommentId, RawComment,
};
use postline_common::model::post::PostMarker;
use postline_common::model::{Id, ModelValidationError};
use postline_common::service::{ChangeFeed, FeedError, PostService, ServiceError, UserService};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use time::UtcDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum PostDetailState {
    #[default]
    Empty,
    Loading {
        post_id: Id<PostMarker>,
    },
    Loaded(PostDetail),
    NotFound {
        post_id: Id<PostMarker>,
    },
    Failed {
        post_id: Id<PostMarker>,
        error: ServiceError,
    },
}

impl PostDetailState {
    #[must_use]
    pub fn detail(&self) -> Option<&PostDetail> {
        match self {
            PostDetailState::Loaded(detail) => Some(detail),
            _ => None,
        }
    }
}

pub struct PostDetailStore<P, U, F> {
    shared: Arc<Shared<P, U, F>>,
}

impl<P, U, F> Clone for PostDetailStore<P, U, F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<P, U, F> {
    posts: Arc<P>,
    users: Arc<U>,
    feed: Arc<F>,
    session: Session,
    inner: Mutex<Inner>,
    updates: watch::Sender<PostDetailState>,
}

struct Inner {
    generation: u64,
    state: PostDetailState,
    channel: Option<ChangeFeedChannel>,
    next_pending: PendingCommentId,
}

impl<P, U, F> PostDetailStore<P, U, F>
where
    P: PostService,
    U: UserService,
    F: ChangeFeed,
{
    #[must_use]
    pub fn new(posts: Arc<P>, users: Arc<U>, feed: Arc<F>, session: Session) -> Self {
        let inner = Inner {
            generation: 0,
            state: PostDetailState::Empty,
            channel: None,
            next_pending: PendingCommentId::default(),
        };

        Self {
            shared: Arc::new(Shared {
                posts,
                users,
                feed,
                session,
                inner: Mutex::new(inner),
                updates: watch::Sender::new(PostDetailState::Empty),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> PostDetailState {
        self.shared.updates.borrow().clone()
    }

    /// Receives every state the store passes through from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PostDetailState> {
        self.shared.updates.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    /// Whether new comments are currently being followed. Turns false when the
    /// change feed fails, until the post is loaded again.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared
            .lock()
            .channel
            .as_ref()
            .is_some_and(ChangeFeedChannel::is_running)
    }

    /// Fetches `post_id` and, once it is loaded, follows its new comments.
    ///
    /// A load that is overtaken by another `load` or by `teardown` returns
    /// [`StoreError::StaleCompletion`] and leaves the state alone.
    pub async fn load(&self, post_id: Id<PostMarker>) -> Result<()> {
        let (generation, previous_channel) = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.state = PostDetailState::Loading { post_id };
            self.shared.publish(&inner);
            (inner.generation, inner.channel.take())
        };
        drop(previous_channel);
        debug!(%post_id, generation, "Loading post");

        let fetched = self.shared.posts.fetch_post_details(post_id).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            debug!(%post_id, generation, "Discarding superseded load");
            return Err(StoreError::StaleCompletion);
        }

        match fetched {
            Ok(Some(details)) => {
                let detail = PostDetail::new(details);
                let handler = FeedHandler {
                    shared: Arc::downgrade(&self.shared),
                    generation,
                    resolver: UserProfileResolver::with_known(
                        self.shared.users.clone(),
                        detail.known_profiles(),
                    ),
                };
                info!(%post_id, comments = detail.comment_count(), "Loaded post");

                inner.channel = Some(ChangeFeedChannel::open(
                    self.shared.feed.clone(),
                    post_id,
                    handler,
                ));
                inner.state = PostDetailState::Loaded(detail);
                self.shared.publish(&inner);
                Ok(())
            }
            Ok(None) => {
                info!(%post_id, "Post not found");
                inner.state = PostDetailState::NotFound { post_id };
                self.shared.publish(&inner);
                Err(StoreError::NotFound(post_id))
            }
            Err(error) => {
                warn!(%post_id, %error, "Loading post failed");
                inner.state = PostDetailState::Failed {
                    post_id,
                    error: error.clone(),
                };
                self.shared.publish(&inner);
                Err(StoreError::Transport(error))
            }
        }
    }

    /// Shows the comment right away as pending, then swaps in the server's row
    /// once the backend confirms it. On failure the pending comment is removed
    /// again and the backend's message is returned.
    pub async fn submit_comment(&self, text: impl Into<String>) -> Result<Comment> {
        let text = CommentText::new(text).map_err(ModelValidationError::from)?;
        let session = &self.shared.session;

        let (generation, pending_id, request) = {
            let mut inner = self.shared.lock();
            let generation = inner.generation;
            let pending_id = inner.next_pending;

            let PostDetailState::Loaded(detail) = &mut inner.state else {
                return Err(StoreError::NotLoaded);
            };
            if detail.pending().is_some() {
                return Err(StoreError::PendingCommentExists);
            }

            let post_id = detail.post().id;
            detail.insert_pending(Comment {
                key: CommentKey::Pending(pending_id),
                post_id,
                author_id: session.user_id(),
                author: Some(session.user.clone()),
                text: text.get().to_owned(),
                created_at: UtcDateTime::now(),
            });
            inner.next_pending = pending_id.next();
            self.shared.publish(&inner);

            let request = CreateComment {
                user_id: session.user_id(),
                post_id,
                text,
            };
            (generation, pending_id, request)
        };
        debug!(post_id = %request.post_id, %pending_id, "Submitting comment");

        let created = self.shared.posts.create_comment(&request).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            debug!(%pending_id, "Discarding comment confirmation of superseded load");
            return Err(StoreError::StaleCompletion);
        }
        let PostDetailState::Loaded(detail) = &mut inner.state else {
            return Err(StoreError::StaleCompletion);
        };

        match created {
            Ok(raw) => {
                let confirmed = Comment::confirmed(raw, Some(session.user.clone()));
                match detail.confirm_pending(pending_id, confirmed.clone()) {
                    ConfirmOutcome::Replaced => {
                        debug!(comment_id = %confirmed.key, "Comment confirmed");
                    }
                    ConfirmOutcome::AlreadyPresent => {
                        debug!(comment_id = %confirmed.key, "Comment already arrived via feed");
                    }
                    ConfirmOutcome::Deleted => {
                        debug!(
                            comment_id = %confirmed.key,
                            "Comment was deleted before it was confirmed"
                        );
                    }
                    ConfirmOutcome::Gone => {
                        debug!(comment_id = %confirmed.key, "Pending comment no longer shown");
                    }
                }
                self.shared.publish(&inner);
                Ok(confirmed)
            }
            Err(error) => {
                warn!(%pending_id, %error, "Submitting comment failed");
                if detail.discard_pending(pending_id) {
                    self.shared.publish(&inner);
                }
                Err(StoreError::Transport(error))
            }
        }
    }

    /// Deletes a comment on the backend, then drops it from the view.
    /// Deleting a comment that is not shown succeeds.
    pub async fn delete_comment(&self, comment_id: Id<CommentMarker>) -> Result<()> {
        let generation = {
            let inner = self.shared.lock();
            if !matches!(inner.state, PostDetailState::Loaded(_)) {
                return Err(StoreError::NotLoaded);
            }
            inner.generation
        };

        let removed = self.shared.posts.remove_comment(comment_id).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            debug!(%comment_id, "Discarding comment removal of superseded load");
            return Err(StoreError::StaleCompletion);
        }
        if let Err(error) = removed {
            warn!(%comment_id, %error, "Deleting comment failed");
            return Err(StoreError::Transport(error));
        }

        if let PostDetailState::Loaded(detail) = &mut inner.state {
            if detail.remove(comment_id) {
                debug!(%comment_id, "Comment deleted");
            } else {
                debug!(%comment_id, "Deleted comment was not shown");
            }
            self.shared.publish(&inner);
        }
        Ok(())
    }

    /// Leaves the current post: the change feed subscription is released and
    /// the store goes back to `Empty`. Outstanding completions are discarded.
    pub async fn teardown(&self) {
        let channel = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.state = PostDetailState::Empty;
            self.shared.publish(&inner);
            inner.channel.take()
        };

        if let Some(channel) = channel {
            channel.shutdown().await;
        }
    }
}

impl<P, U, F> Shared<P, U, F> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.state.clone());
    }

    fn apply_pushed_insert(&self, generation: u64, comment: Comment) {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(comment_id = %comment.key, "Discarding insert for superseded load");
            return;
        }
        let PostDetailState::Loaded(detail) = &mut inner.state else {
            return;
        };

        let comment_id = comment.key;
        match detail.merge_pushed(comment) {
            PushOutcome::Inserted => debug!(%comment_id, "New comment arrived"),
            PushOutcome::ConfirmedPending(pending_id) => {
                debug!(%comment_id, %pending_id, "Feed confirmed pending comment");
            }
            PushOutcome::Duplicate => {
                debug!(%comment_id, "Ignoring duplicate comment delivery");
                return;
            }
        }
        self.publish(&inner);
    }

    fn record_feed_error(&self, generation: u64, error: FeedError) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        if let PostDetailState::Loaded(detail) = &mut inner.state {
            detail.set_feed_error(error);
            self.publish(&inner);
        }
    }
}

struct FeedHandler<P, U, F> {
    shared: Weak<Shared<P, U, F>>,
    generation: u64,
    resolver: UserProfileResolver<U>,
}

impl<P, U, F> ChangeFeedHandler for FeedHandler<P, U, F>
where
    P: PostService,
    U: UserService,
    F: ChangeFeed,
{
    async fn on_insert(&self, raw: RawComment) {
        let user_id = raw.user_id;
        let author = match self.resolver.resolve(user_id).await {
            Ok(profile) => Some(profile),
            Err(error) => {
                warn!(%user_id, %error, "Could not resolve comment author");
                None
            }
        };

        if let Some(shared) = self.shared.upgrade() {
            shared.apply_pushed_insert(self.generation, Comment::confirmed(raw, author));
        }
    }

    fn on_error(&self, error: FeedError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.record_feed_error(self.generation, error);
        }
    }
}
