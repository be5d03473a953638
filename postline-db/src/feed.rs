//! Comment change feed over Postgres `LISTEN`/`NOTIFY`.
//!
//! The `comments_notify_insert` trigger publishes the ids of every inserted
//! comment on the channel `post_comments_<post id>`, so a subscription only ever
//! hears about the rows of the post it listens for. The row itself is read back
//! through the pool.

use crate::client::DbClient;
use crate::record::CommentPayload;
use postline_common::model::Id;
use postline_common::model::comment::RawComment;
use postline_common::model::post::PostMarker;
use postline_common::service::{ChangeFeed, CommentSubscription, FeedError};
use sqlx::postgres::PgListener;
use tracing::{debug, warn};

#[must_use]
pub fn channel_name(post_id: Id<PostMarker>) -> String {
    format!("post_comments_{post_id}")
}

#[derive(Clone, Debug)]
pub struct PgChangeFeed {
    db: DbClient,
}

impl PgChangeFeed {
    #[must_use]
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

impl ChangeFeed for PgChangeFeed {
    type Subscription = PgCommentSubscription;

    async fn subscribe(
        &self,
        post_id: Id<PostMarker>,
    ) -> Result<PgCommentSubscription, FeedError> {
        let channel = channel_name(post_id);

        let mut listener = PgListener::connect_with(self.db.pool())
            .await
            .map_err(|err| FeedError::Handshake(err.to_string()))?;
        listener
            .listen(&channel)
            .await
            .map_err(|err| FeedError::Handshake(err.to_string()))?;

        debug!(%channel, "Listening for comment inserts");
        Ok(PgCommentSubscription {
            db: self.db.clone(),
            listener,
            channel,
            post_id,
        })
    }
}

/// A dedicated connection listening on one post's channel.
pub struct PgCommentSubscription {
    db: DbClient,
    listener: PgListener,
    channel: String,
    post_id: Id<PostMarker>,
}

impl CommentSubscription for PgCommentSubscription {
    async fn next_insert(&mut self) -> Option<Result<RawComment, FeedError>> {
        loop {
            let notification = match self.listener.try_recv().await {
                Ok(Some(notification)) => notification,
                // Notifications sent while the connection was down are gone.
                Ok(None) => {
                    return Some(Err(FeedError::Stream(
                        "listener connection was lost".to_owned(),
                    )));
                }
                Err(err) => return Some(Err(FeedError::Stream(err.to_string()))),
            };

            let payload = match CommentPayload::parse(notification.payload()) {
                Ok(payload) => payload,
                Err(err) => return Some(Err(FeedError::Stream(err.to_string()))),
            };
            if payload.post_id() != self.post_id {
                warn!(
                    channel = %self.channel,
                    comment_post_id = %payload.post_id(),
                    "Skipping comment of another post"
                );
                continue;
            }

            match self.db.fetch_comment(payload.comment_id()).await {
                Ok(Some(raw)) => return Some(Ok(raw)),
                Ok(None) => {
                    debug!(
                        channel = %self.channel,
                        comment_id = %payload.comment_id(),
                        "Inserted comment was deleted before it could be read"
                    );
                }
                Err(err) => return Some(Err(FeedError::Stream(err.to_string()))),
            }
        }
    }

    async fn unsubscribe(mut self) {
        if let Err(err) = self.listener.unlisten(&self.channel).await {
            debug!(channel = %self.channel, error = %err, "Unlisten failed, dropping connection");
        }
        debug!(channel = %self.channel, "Stopped listening for comment inserts");
    }
}
