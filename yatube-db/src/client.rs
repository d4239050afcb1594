use crate::record::{
    AuthenticationRecord, CredentialsRecord, FullPostRecord, GroupRecord, UserRecord,
};
use sqlx::{
    SqlitePool,
    migrate::MigrateError,
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::{num::NonZeroU32, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication, TokenLifetime},
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::{Page, Paginator},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("The username {0} is already taken")]
    UsernameTaken(Username),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Which posts a listing covers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum PostFilter {
    #[default]
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
}

impl PostFilter {
    fn bind_values(self) -> (Option<i64>, Option<i64>) {
        match self {
            PostFilter::All => (None, None),
            PostFilter::Group(group) => (Some(group.get()), None),
            PostFilter::Author(author) => (None, Some(author.get())),
        }
    }
}

const FULL_POST_SELECT: &str = "
    SELECT
        posts.post_id,
        posts.text,
        posts.created_at,
        users.user_id,
        users.username,
        post_groups.group_id,
        post_groups.title AS group_title,
        post_groups.slug AS group_slug,
        post_groups.description AS group_description
    FROM
        posts
        JOIN users ON users.user_id = posts.author_id
        LEFT JOIN post_groups ON post_groups.group_id = posts.group_id
";

/// Timestamps are stored as RFC 3339 text; whole seconds keep text order equal to time order.
fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    /// Opens (creating if needed) the database at `database_url` and migrates it.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        debug!(database_url, "Connected to database");

        Self::migrated(pool).await
    }

    /// A private database that lives as long as the client.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to `:memory:` opens a fresh database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!().run(&pool).await?;
        debug!("Database migrations applied");

        Ok(Self { pool })
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let result = query_scalar::<_, i64>(
            "
            INSERT INTO users (username, password_hash)
            VALUES (?1, ?2)
            RETURNING user_id
            ",
        )
        .bind(user.username.get())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user_id) => Ok(user_id.into()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(DbError::UsernameTaken(user.username.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.username
            FROM
                users
            WHERE
                users.username = ?1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    /// The user together with their stored password hash.
    pub async fn fetch_credentials(&self, username: &Username) -> Result<Option<(User, String)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.password_hash
            FROM
                users
            WHERE
                users.username = ?1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(<(User, String)>::try_from).transpose()?;
        Ok(credentials)
    }

    /// Inserts the group, or refreshes title and description of the one with the same slug.
    pub async fn upsert_group(&self, group: &CreateGroup) -> Result<Id<GroupMarker>> {
        let group_id = query_scalar::<_, i64>(
            "
            INSERT INTO post_groups (title, slug, description)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (slug) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            RETURNING group_id
            ",
        )
        .bind(group.title.get())
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(group_id.into())
    }

    pub async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            WHERE
                post_groups.slug = ?1
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            ORDER BY
                post_groups.title,
                post_groups.group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(&format!(
            "{FULL_POST_SELECT} WHERE posts.post_id = ?1"
        ))
        .bind(post_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let (group_id, author_id) = filter.bind_values();

        let count = query_scalar::<_, i64>(
            "
            SELECT COUNT(*)
            FROM posts
            WHERE
                (?1 IS NULL OR posts.group_id = ?1)
                AND (?2 IS NULL OR posts.author_id = ?2)
            ",
        )
        .bind(group_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// The requested page of matching posts, newest first, plus how many posts match in total.
    pub async fn fetch_post_page(
        &self,
        filter: PostFilter,
        per_page: NonZeroU32,
        requested_page: Option<&str>,
    ) -> Result<(Page<Post>, u64)> {
        let paginator = Paginator::new(self.count_posts(filter).await?, per_page);
        let window = paginator.get_page(requested_page);
        let (group_id, author_id) = filter.bind_values();

        let records = query_as::<_, FullPostRecord>(&format!(
            "
            {FULL_POST_SELECT}
            WHERE
                (?1 IS NULL OR posts.group_id = ?1)
                AND (?2 IS NULL OR posts.author_id = ?2)
            ORDER BY
                posts.created_at DESC,
                posts.post_id DESC
            LIMIT ?3 OFFSET ?4
            "
        ))
        .bind(group_id)
        .bind(author_id)
        .bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(window.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;

        Ok((window.into_page(posts), paginator.count()))
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (text, created_at, author_id, group_id)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING post_id
            ",
        )
        .bind(&post.content.text)
        .bind(now_utc())
        .bind(post.author.get())
        .bind(post.content.group.map(Id::get))
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    /// Replaces text and group of an existing post. Returns whether the post existed.
    pub async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET
                text = ?1,
                group_id = ?2
            WHERE
                posts.post_id = ?3
            ",
        )
        .bind(&content.text)
        .bind(content.group.map(Id::get))
        .bind(post_id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn create_auth(
        &self,
        token_hash: &AuthTokenHash,
        user_id: Id<UserMarker>,
        expires_after: Option<TokenLifetime>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_after_seconds)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(&token_hash.0[..])
        .bind(user_id.get())
        .bind(now_utc())
        .bind(expires_after.map(TokenLifetime::whole_seconds))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                auth_tokens.token_hash,
                auth_tokens.created_at,
                auth_tokens.expires_after_seconds,
                users.user_id,
                users.username
            FROM
                auth_tokens
                JOIN users ON users.user_id = auth_tokens.user_id
            WHERE
                auth_tokens.token_hash = ?1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    /// Revokes a token. Returns whether it existed.
    pub async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM auth_tokens WHERE auth_tokens.token_hash = ?1")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
