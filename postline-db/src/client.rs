use crate::record::{
    CommentRecord, DbDataError, FullCommentRecord, FullNotificationRecord, FullPostRecord,
    UserRecord,
};
use postline_common::model::Id;
use postline_common::model::comment::{Comment, CommentMarker, CreateComment, RawComment};
use postline_common::model::notification::NotificationRecord;
use postline_common::model::post::{Post, PostDetails, PostMarker};
use postline_common::model::user::{Profile, UserMarker};
use postline_common::service::{
    NotificationService, PostService, ServiceError, ServiceResult, UserService,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, query, query_as};
use thiserror::Error;
use tracing::warn;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] DbDataError),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        warn!(error = %value, "Database call failed");
        ServiceError::new(value.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<Profile>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.name,
                users.image
            FROM
                users
            WHERE
                users.id = $1
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Profile::from))
    }

    pub async fn fetch_post_details(
        &self,
        post_id: Id<PostMarker>,
    ) -> Result<Option<PostDetails>> {
        let Some(post_record) = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.id AS post_id,
                posts.body,
                posts.file,
                posts.created_at,
                users.id AS user_id,
                users.name,
                users.image
            FROM
                posts JOIN users ON posts.user_id = users.id
            WHERE
                posts.id = $1
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let comment_records = query_as::<_, FullCommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.user_id,
                comments.text,
                comments.created_at,
                users.name,
                users.image
            FROM
                comments LEFT JOIN users ON comments.user_id = users.id
            WHERE
                comments.post_id = $1
            ORDER BY
                comments.created_at DESC
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PostDetails {
            post: Post::from(post_record),
            comments: comment_records.into_iter().map(Comment::from).collect(),
        }))
    }

    pub async fn fetch_comment(&self, comment_id: Id<CommentMarker>) -> Result<Option<RawComment>> {
        let record = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.user_id,
                comments.text,
                comments.created_at
            FROM
                comments
            WHERE
                comments.id = $1
            ",
        )
        .bind(comment_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(RawComment::from))
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<RawComment> {
        let record = query_as::<_, CommentRecord>(
            "
            INSERT INTO comments (post_id, user_id, text)
            VALUES ($1, $2, $3)
            RETURNING
                comments.id AS comment_id,
                comments.post_id,
                comments.user_id,
                comments.text,
                comments.created_at
            ",
        )
        .bind(comment.post_id.get().cast_signed())
        .bind(comment.user_id.get().cast_signed())
        .bind(comment.text.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    pub async fn remove_comment(&self, comment_id: Id<CommentMarker>) -> Result<()> {
        query("DELETE FROM comments WHERE comments.id = $1")
            .bind(comment_id.get().cast_signed())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn fetch_notifications(
        &self,
        receiver_id: Id<UserMarker>,
    ) -> Result<Vec<NotificationRecord>> {
        let records = query_as::<_, FullNotificationRecord>(
            "
            SELECT
                notifications.id AS notification_id,
                notifications.receiver_id,
                notifications.title,
                notifications.data,
                notifications.created_at,
                users.id AS sender_id,
                users.name AS sender_name,
                users.image AS sender_image
            FROM
                notifications LEFT JOIN users ON notifications.sender_id = users.id
            WHERE
                notifications.receiver_id = $1
            ORDER BY
                notifications.created_at DESC
            ",
        )
        .bind(receiver_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        let notifications = records
            .into_iter()
            .map(NotificationRecord::try_from)
            .collect::<Result<_, _>>()?;
        Ok(notifications)
    }
}

impl PostService for DbClient {
    async fn fetch_post_details(
        &self,
        post_id: Id<PostMarker>,
    ) -> ServiceResult<Option<PostDetails>> {
        Ok(DbClient::fetch_post_details(self, post_id).await?)
    }

    async fn create_comment(&self, comment: &CreateComment) -> ServiceResult<RawComment> {
        Ok(DbClient::create_comment(self, comment).await?)
    }

    async fn remove_comment(&self, comment_id: Id<CommentMarker>) -> ServiceResult<()> {
        Ok(DbClient::remove_comment(self, comment_id).await?)
    }
}

impl UserService for DbClient {
    async fn get_user_data(&self, user_id: Id<UserMarker>) -> ServiceResult<Option<Profile>> {
        Ok(self.fetch_user(user_id).await?)
    }
}

impl NotificationService for DbClient {
    async fn fetch_notifications(
        &self,
        user_id: Id<UserMarker>,
    ) -> ServiceResult<Vec<NotificationRecord>> {
        Ok(DbClient::fetch_notifications(self, user_id).await?)
    }
}
