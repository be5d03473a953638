use postline_client::notifications::{NotificationFeedLoader, NotificationFeedState};
use postline_client::session::Session;
use postline_client::store::{PostDetailState, PostDetailStore};
use postline_common::model::{Id, user::UserMarker};
use postline_db::client::{DbClient, DbError};
use postline_db::feed::PgChangeFeed;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Viewer with id {0} does not exist")]
    UnknownViewer(Id<UserMarker>),
    #[error("Error waiting for shutdown signal: {0}")]
    Signal(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    database_url: String,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    viewer_id: u64,
    post_id: u64,
    #[serde(default)]
    run_migrations: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "postline_client=debug,postline_db=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn render_post(state: &PostDetailState) {
    match state {
        PostDetailState::Empty => debug!("No post open"),
        PostDetailState::Loading { post_id } => info!(%post_id, "Loading post"),
        PostDetailState::Loaded(detail) => {
            info!(
                post_id = %detail.post().id,
                author = %detail.post().author.name,
                comments = detail.comment_count(),
                live = detail.feed_error().is_none(),
                "Post"
            );
            for comment in detail.comments() {
                let author = comment
                    .author
                    .as_ref()
                    .map_or("unknown user", |author| author.name.as_str());
                info!(
                    id = %comment.key,
                    pending = comment.is_pending(),
                    %author,
                    text = %comment.text,
                    "  Comment"
                );
            }
        }
        PostDetailState::NotFound { post_id } => warn!(%post_id, "Post not found"),
        PostDetailState::Failed { post_id, error } => {
            warn!(%post_id, %error, "Post could not be loaded");
        }
    }
}

fn render_notifications(state: &NotificationFeedState) {
    match state {
        NotificationFeedState::NotLoaded => {}
        NotificationFeedState::Loaded(notifications) if notifications.is_empty() => {
            info!("No notifications yet");
        }
        NotificationFeedState::Loaded(notifications) => {
            for notification in notifications {
                let sender = notification
                    .sender
                    .as_ref()
                    .map_or("unknown user", |sender| sender.name.as_str());
                info!(
                    %sender,
                    title = %notification.title,
                    date = %notification.display_date(),
                    post_id = %notification.target.post_id,
                    "Notification"
                );
            }
        }
        NotificationFeedState::Failed(error) => warn!(%error, "Notifications could not be loaded"),
    }
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db = Arc::new(DbClient::connect(&env.database_url, env.database_max_connections).await?);
    if env.run_migrations {
        db.migrate().await?;
    }
    let feed = Arc::new(PgChangeFeed::new(DbClient::clone(&db)));

    let viewer_id = Id::new(env.viewer_id);
    let viewer = db
        .fetch_user(viewer_id)
        .await?
        .ok_or(InitError::UnknownViewer(viewer_id))?;
    let session = Session::new(viewer);

    let notifications = NotificationFeedLoader::new(db.clone());
    if let Some(state) = notifications.load(session.user_id()).await {
        render_notifications(&state);
    }

    let store = PostDetailStore::new(db.clone(), db, feed, session);
    let mut updates = store.subscribe();
    let renderer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            render_post(&updates.borrow_and_update());
        }
    });

    if let Err(err) = store.load(Id::new(env.post_id)).await
        && !err.is_silent()
    {
        error!(error = %err, "Could not open post");
    }

    tokio::signal::ctrl_c().await.map_err(InitError::Signal)?;
    store.teardown().await;
    drop(store);
    if let Err(err) = renderer.await {
        warn!(error = %err, "Renderer stopped unexpectedly");
    }

    Ok(())
}
