//! One live subscription to the comment inserts of a single post.
//!
//! The subscription is owned by a background task. Closing the channel, or
//! dropping it, cancels that task, which then releases the subscription on
//! whatever step it was at, including a handshake still in progress.

use postline_common::model::{Id, comment::RawComment, post::PostMarker};
use postline_common::service::{ChangeFeed, CommentSubscription, FeedError};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives what a [`ChangeFeedChannel`] delivers.
pub trait ChangeFeedHandler: Send + Sync + 'static {
    /// Called for every inserted row, in commit order. The next row is not
    /// delivered before the returned future completes.
    fn on_insert(&self, raw: RawComment) -> impl Future<Output = ()> + Send;

    /// Called at most once, after which nothing more is delivered.
    fn on_error(&self, error: FeedError);
}

pub struct ChangeFeedChannel {
    post_id: Id<PostMarker>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeedChannel {
    /// Starts subscribing to `post_id`. Must be called within a tokio runtime.
    pub fn open<F, H>(feed: Arc<F>, post_id: Id<PostMarker>, handler: H) -> Self
    where
        F: ChangeFeed,
        H: ChangeFeedHandler,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(feed, post_id, handler, cancel.clone()));
        debug!(%post_id, "Opened comment channel");

        Self {
            post_id,
            cancel,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn post_id(&self) -> Id<PostMarker> {
        self.post_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the subscription is still being set up or delivering. False once
    /// the channel was closed or the feed failed or ended.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.is_closed() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Releases the subscription. Calling this more than once has no effect.
    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(post_id = %self.post_id, "Closing comment channel");
            self.cancel.cancel();
        }
    }

    /// Closes the channel and waits until the subscription has been released.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(post_id = %self.post_id, error = %err, "Comment channel task failed");
        }
    }
}

impl Drop for ChangeFeedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run<F, H>(feed: Arc<F>, post_id: Id<PostMarker>, handler: H, cancel: CancellationToken)
where
    F: ChangeFeed,
    H: ChangeFeedHandler,
{
    let subscribed = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(%post_id, "Comment channel closed during handshake");
            return;
        }
        subscribed = feed.subscribe(post_id) => subscribed,
    };

    let mut subscription = match subscribed {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(%post_id, error = %err, "Comment channel handshake failed");
            handler.on_error(err);
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = subscription.next_insert() => next,
        };

        match next {
            Some(Ok(raw)) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = handler.on_insert(raw) => {}
                }
            }
            Some(Err(err)) => {
                warn!(%post_id, error = %err, "Comment channel broke off");
                handler.on_error(err);
                break;
            }
            None => {
                debug!(%post_id, "Comment feed ended");
                break;
            }
        }
    }

    subscription.unsubscribe().await;
    debug!(%post_id, "Released comment subscription");
}
