//! In-memory backend and change feed for tests.

use crate::session::Session;
use postline_common::model::Id;
use postline_common::model::comment::{
    Comment, CommentKey, CommentMarker, CreateComment, PendingCommentId, RawComment,
};
use postline_common::model::notification::{NotificationRecord, NotificationTarget};
use postline_common::model::post::{Post, PostDetails, PostMarker};
use postline_common::model::user::{Profile, UserMarker};
use postline_common::service::{
    ChangeFeed, CommentSubscription, FeedError, NotificationService, PostService, ServiceError,
    ServiceResult, UserService,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::macros::utc_datetime;
use time::{Duration, UtcDateTime};
use tokio::sync::{mpsc, watch};

const BASE_TIME: UtcDateTime = utc_datetime!(2025-10-01 12:00);

pub fn at_minute(minute: i64) -> UtcDateTime {
    BASE_TIME + Duration::minutes(minute)
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn profile(user_id: u64) -> Profile {
    Profile::new(user_id.into(), format!("user-{user_id}"))
}

pub fn session(user_id: u64) -> Session {
    Session::new(profile(user_id))
}

pub fn post(post_id: u64, author_id: u64) -> Post {
    Post {
        id: post_id.into(),
        author: profile(author_id),
        body: Some(format!("post {post_id}")),
        media: None,
        created_at: BASE_TIME,
    }
}

pub fn raw_comment(id: u64, post_id: u64, user_id: u64, text: &str, minute: i64) -> RawComment {
    RawComment {
        id: id.into(),
        post_id: post_id.into(),
        user_id: user_id.into(),
        text: text.to_owned(),
        created_at: at_minute(minute),
    }
}

pub fn comment(id: u64, post_id: u64, user_id: u64, text: &str, minute: i64) -> Comment {
    Comment::confirmed(
        raw_comment(id, post_id, user_id, text, minute),
        Some(profile(user_id)),
    )
}

pub fn pending_comment(
    pending_id: PendingCommentId,
    post_id: u64,
    user_id: u64,
    text: &str,
) -> Comment {
    Comment {
        key: CommentKey::Pending(pending_id),
        post_id: post_id.into(),
        author_id: user_id.into(),
        author: Some(profile(user_id)),
        text: text.to_owned(),
        created_at: at_minute(60),
    }
}

pub fn notification(id: u64, receiver_id: u64, minute: i64) -> NotificationRecord {
    NotificationRecord {
        id: id.into(),
        receiver_id: receiver_id.into(),
        sender: Some(profile(100)),
        title: "Commented on your post".to_owned(),
        target: NotificationTarget {
            post_id: 1.into(),
            comment_id: Some(id.into()),
        },
        created_at: at_minute(minute),
    }
}

/// A barrier a fake call waits on until the test opens it.
#[derive(Clone)]
pub struct Gate(Arc<watch::Sender<bool>>);

impl Gate {
    pub fn closed() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }

    pub fn open(&self) {
        self.0.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut open = self.0.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

async fn pass(gate: Option<Gate>) {
    if let Some(gate) = gate {
        gate.wait().await;
    }
}

#[derive(Default)]
struct BackendState {
    posts: HashMap<Id<PostMarker>, PostDetails>,
    users: HashMap<Id<UserMarker>, Profile>,
    notifications: Vec<NotificationRecord>,
    post_gates: HashMap<Id<PostMarker>, Gate>,
    create_gate: Option<Gate>,
    notification_gate: Option<Gate>,
    post_fetch_error: Option<String>,
    create_error: Option<String>,
    remove_error: Option<String>,
    user_error: Option<String>,
    notification_error: Option<String>,
    next_comment_id: u64,
    created: Vec<RawComment>,
    removed: Vec<Id<CommentMarker>>,
    user_lookups: usize,
}

#[derive(Default)]
pub struct TestBackend {
    state: Mutex<BackendState>,
}

impl TestBackend {
    fn with<T>(&self, f: impl FnOnce(&mut BackendState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_post(&self, details: PostDetails) {
        self.with(|state| state.posts.insert(details.post.id, details));
    }

    pub fn add_user(&self, profile: Profile) {
        self.with(|state| state.users.insert(profile.id, profile));
    }

    pub fn add_notification(&self, notification: NotificationRecord) {
        self.with(|state| state.notifications.push(notification));
    }

    pub fn gate_post(&self, post_id: Id<PostMarker>) -> Gate {
        let gate = Gate::closed();
        self.with(|state| state.post_gates.insert(post_id, gate.clone()));
        gate
    }

    pub fn gate_creates(&self) -> Gate {
        let gate = Gate::closed();
        self.with(|state| state.create_gate = Some(gate.clone()));
        gate
    }

    pub fn gate_notifications(&self) -> Gate {
        let gate = Gate::closed();
        self.with(|state| state.notification_gate = Some(gate.clone()));
        gate
    }

    pub fn ungate_notifications(&self) {
        self.with(|state| state.notification_gate = None);
    }

    pub fn fail_post_fetches(&self, message: &str) {
        self.with(|state| state.post_fetch_error = Some(message.to_owned()));
    }

    pub fn fail_creates(&self, message: &str) {
        self.with(|state| state.create_error = Some(message.to_owned()));
    }

    pub fn fail_removes(&self, message: &str) {
        self.with(|state| state.remove_error = Some(message.to_owned()));
    }

    pub fn fail_user_lookups(&self, message: &str) {
        self.with(|state| state.user_error = Some(message.to_owned()));
    }

    pub fn fail_notification_fetches(&self, message: &str) {
        self.with(|state| state.notification_error = Some(message.to_owned()));
    }

    pub fn set_next_comment_id(&self, id: u64) {
        self.with(|state| state.next_comment_id = id);
    }

    pub fn created_comments(&self) -> Vec<RawComment> {
        self.with(|state| state.created.clone())
    }

    pub fn removed_comments(&self) -> Vec<Id<CommentMarker>> {
        self.with(|state| state.removed.clone())
    }

    pub fn user_lookups(&self) -> usize {
        self.with(|state| state.user_lookups)
    }
}

impl PostService for TestBackend {
    async fn fetch_post_details(
        &self,
        post_id: Id<PostMarker>,
    ) -> ServiceResult<Option<PostDetails>> {
        pass(self.with(|state| state.post_gates.get(&post_id).cloned())).await;
        self.with(|state| match &state.post_fetch_error {
            Some(message) => Err(ServiceError::new(message.clone())),
            None => Ok(state.posts.get(&post_id).cloned()),
        })
    }

    async fn create_comment(&self, comment: &CreateComment) -> ServiceResult<RawComment> {
        pass(self.with(|state| state.create_gate.clone())).await;
        self.with(|state| {
            if let Some(message) = &state.create_error {
                return Err(ServiceError::new(message.clone()));
            }
            let raw = RawComment {
                id: state.next_comment_id.into(),
                post_id: comment.post_id,
                user_id: comment.user_id,
                text: comment.text.get().to_owned(),
                created_at: at_minute(120),
            };
            state.next_comment_id += 1;
            state.created.push(raw.clone());
            Ok(raw)
        })
    }

    async fn remove_comment(&self, comment_id: Id<CommentMarker>) -> ServiceResult<()> {
        self.with(|state| {
            if let Some(message) = &state.remove_error {
                return Err(ServiceError::new(message.clone()));
            }
            state.removed.push(comment_id);
            Ok(())
        })
    }
}

impl UserService for TestBackend {
    async fn get_user_data(&self, user_id: Id<UserMarker>) -> ServiceResult<Option<Profile>> {
        self.with(|state| {
            state.user_lookups += 1;
            match &state.user_error {
                Some(message) => Err(ServiceError::new(message.clone())),
                None => Ok(state.users.get(&user_id).cloned()),
            }
        })
    }
}

impl NotificationService for TestBackend {
    async fn fetch_notifications(
        &self,
        user_id: Id<UserMarker>,
    ) -> ServiceResult<Vec<NotificationRecord>> {
        pass(self.with(|state| state.notification_gate.clone())).await;
        self.with(|state| match &state.notification_error {
            Some(message) => Err(ServiceError::new(message.clone())),
            None => Ok(state
                .notifications
                .iter()
                .filter(|notification| notification.receiver_id == user_id)
                .cloned()
                .collect()),
        })
    }
}

type FeedItem = Result<RawComment, FeedError>;

#[derive(Default)]
struct FeedState {
    subscribers: Vec<(Id<PostMarker>, mpsc::UnboundedSender<FeedItem>)>,
    subscribed: usize,
    unsubscribed: usize,
    active: Vec<Id<PostMarker>>,
    fail_handshakes: bool,
    handshake_gate: Option<Gate>,
}

/// Change feed whose rows the test pushes by hand.
#[derive(Default)]
pub struct TestFeed {
    state: Arc<Mutex<FeedState>>,
}

impl TestFeed {
    fn with<T>(&self, f: impl FnOnce(&mut FeedState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Delivers `raw` to every open subscription of its post.
    pub fn push(&self, raw: RawComment) {
        self.with(|state| {
            for (post_id, sender) in &state.subscribers {
                if *post_id == raw.post_id {
                    let _ = sender.send(Ok(raw.clone()));
                }
            }
        });
    }

    pub fn break_stream(&self, post_id: Id<PostMarker>) {
        self.with(|state| {
            for (subscribed_post, sender) in &state.subscribers {
                if *subscribed_post == post_id {
                    let _ = sender.send(Err(FeedError::Stream("connection reset".to_owned())));
                }
            }
        });
    }

    pub fn fail_handshakes(&self) {
        self.with(|state| state.fail_handshakes = true);
    }

    pub fn hold_handshakes(&self) {
        self.with(|state| state.handshake_gate = Some(Gate::closed()));
    }

    pub fn release_handshakes(&self) {
        if let Some(gate) = self.with(|state| state.handshake_gate.take()) {
            gate.open();
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.with(|state| state.subscribed)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.with(|state| state.unsubscribed)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.with(|state| state.active.len())
    }

    pub fn subscribed_posts(&self) -> Vec<Id<PostMarker>> {
        self.with(|state| state.active.clone())
    }
}

impl ChangeFeed for TestFeed {
    type Subscription = TestSubscription;

    async fn subscribe(&self, post_id: Id<PostMarker>) -> Result<TestSubscription, FeedError> {
        let gate = self.with(|state| {
            state.subscribed += 1;
            state.handshake_gate.clone()
        });
        pass(gate).await;

        self.with(|state| {
            if state.fail_handshakes {
                return Err(FeedError::Handshake("refused".to_owned()));
            }
            let (sender, receiver) = mpsc::unbounded_channel();
            state.subscribers.push((post_id, sender));
            state.active.push(post_id);
            Ok(TestSubscription {
                post_id,
                receiver,
                feed: self.state.clone(),
            })
        })
    }
}

pub struct TestSubscription {
    post_id: Id<PostMarker>,
    receiver: mpsc::UnboundedReceiver<FeedItem>,
    feed: Arc<Mutex<FeedState>>,
}

impl CommentSubscription for TestSubscription {
    async fn next_insert(&mut self) -> Option<FeedItem> {
        self.receiver.recv().await
    }

    async fn unsubscribe(self) {
        let mut state = self.feed.lock().unwrap();
        state.unsubscribed += 1;
        if let Some(index) = state.active.iter().position(|post_id| *post_id == self.post_id) {
            state.active.remove(index);
        }
    }
}
