use postline_common::model::Id;
use postline_common::model::notification::NotificationRecord;
use postline_common::model::user::UserMarker;
use postline_common::service::{NotificationService, ServiceError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum NotificationFeedState {
    #[default]
    NotLoaded,
    /// Most recent first; may be empty.
    Loaded(Vec<NotificationRecord>),
    Failed(ServiceError),
}

/// One-shot loader for a user's notifications. Call [`load`](Self::load)
/// again to refresh.
pub struct NotificationFeedLoader<N> {
    notifications: Arc<N>,
    generation: AtomicU64,
    updates: watch::Sender<NotificationFeedState>,
}

impl<N: NotificationService> NotificationFeedLoader<N> {
    #[must_use]
    pub fn new(notifications: Arc<N>) -> Self {
        Self {
            notifications,
            generation: AtomicU64::new(0),
            updates: watch::Sender::new(NotificationFeedState::NotLoaded),
        }
    }

    #[must_use]
    pub fn state(&self) -> NotificationFeedState {
        self.updates.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotificationFeedState> {
        self.updates.subscribe()
    }

    /// Fetches the notifications addressed to `user_id`.
    ///
    /// Returns `None` when a newer `load` started before this one finished;
    /// the state then belongs to that newer call.
    pub async fn load(&self, user_id: Id<UserMarker>) -> Option<NotificationFeedState> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let fetched = self.notifications.fetch_notifications(user_id).await;

        let state = match fetched {
            Ok(mut notifications) => {
                notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                debug!(%user_id, count = notifications.len(), "Loaded notifications");
                NotificationFeedState::Loaded(notifications)
            }
            Err(error) => {
                warn!(%user_id, %error, "Loading notifications failed");
                NotificationFeedState::Failed(error)
            }
        };

        let applied = self.updates.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state.clone();
            true
        });

        if applied {
            Some(state)
        } else {
            debug!(%user_id, "Discarding superseded notification load");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::notifications::{NotificationFeedLoader, NotificationFeedState};
    use crate::testing::{TestBackend, notification, settle};
    use std::sync::Arc;

    #[tokio::test]
    async fn starts_not_loaded() {
        let loader = NotificationFeedLoader::new(Arc::new(TestBackend::default()));

        assert_eq!(loader.state(), NotificationFeedState::NotLoaded);
    }

    #[tokio::test]
    async fn empty_result_is_loaded() {
        let loader = NotificationFeedLoader::new(Arc::new(TestBackend::default()));

        let state = loader.load(3.into()).await;

        assert_eq!(state, Some(NotificationFeedState::Loaded(vec![])));
        assert_eq!(loader.state(), NotificationFeedState::Loaded(vec![]));
    }

    #[tokio::test]
    async fn failure_is_not_an_empty_list() {
        let backend = Arc::new(TestBackend::default());
        backend.fail_notification_fetches("offline");
        let loader = NotificationFeedLoader::new(backend);

        loader.load(3.into()).await;

        let NotificationFeedState::Failed(error) = loader.state() else {
            panic!("expected the load to fail");
        };
        assert_eq!(error.message, "offline");
    }

    #[tokio::test]
    async fn notifications_are_most_recent_first() {
        let backend = Arc::new(TestBackend::default());
        backend.add_notification(notification(1, 3, 1));
        backend.add_notification(notification(2, 3, 5));
        backend.add_notification(notification(3, 4, 9));
        backend.add_notification(notification(4, 3, 2));
        let loader = NotificationFeedLoader::new(backend);

        loader.load(3.into()).await;

        let NotificationFeedState::Loaded(notifications) = loader.state() else {
            panic!("expected notifications");
        };
        let ids: Vec<u64> = notifications.iter().map(|record| record.id.get()).collect();
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[tokio::test]
    async fn superseded_load_is_discarded() {
        let backend = Arc::new(TestBackend::default());
        backend.add_notification(notification(1, 3, 1));
        let gate = backend.gate_notifications();
        let loader = Arc::new(NotificationFeedLoader::new(backend.clone()));

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(3.into()).await }
        });
        settle().await;
        backend.fail_notification_fetches("second attempt failed");
        backend.ungate_notifications();
        let second = loader.load(3.into()).await;
        gate.open();

        assert!(matches!(second, Some(NotificationFeedState::Failed(_))));
        assert_eq!(first.await.unwrap(), None);
        assert!(matches!(loader.state(), NotificationFeedState::Failed(_)));
    }
}
