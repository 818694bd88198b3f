use crate::{
    Result,
    record::{
        AccountRecord, CommentCountRecord, HobbyTagRecord, PostHobbyTagRecord, PostImageRecord,
        PostSummaryRecord, UserRecord,
    },
    transaction::DbTransaction,
};
use async_trait::async_trait;
use hobbyshare_common::{
    model::{
        Id,
        auth::{Account, CreateAccount, Email},
        post::{CommentCount, PostImage, PostImageMarker, PostMarker, PostSummary},
        tag::{HobbyTag, HobbyTagMarker},
        user::{User, UserMarker},
    },
    store::{self, PostStore, UserStore},
    util::PageSize,
};
use sqlx::{PgConnection, PgPool, migrate::Migrator, postgres::PgPoolOptions, query, query_as};
use std::collections::HashMap;
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

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

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;

        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<DbTransaction> {
        Ok(DbTransaction::new(self.pool.begin().await?))
    }

    pub async fn fetch_account_by_email(&self, email: &Email) -> Result<Option<Account>> {
        let record = query_as::<_, AccountRecord>(
            "
            SELECT
                users.user_id,
                users.nickname,
                users.email,
                users.password_hash
            FROM
                users.users
            WHERE
                users.email = $1
            ",
        )
        .bind(email.get())
        .fetch_optional(&self.pool)
        .await?;

        let account = record.map(Account::try_from).transpose()?;
        Ok(account)
    }

    pub async fn create_account(&self, account: &CreateAccount) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (email, nickname, password_hash)
            VALUES ($1, $2, $3)
            RETURNING users.user_id, users.nickname
            ",
        )
        .bind(account.email.get())
        .bind(account.nickname.get())
        .bind(&account.password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(User::try_from(record)?)
    }

    pub async fn replace_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
        names: &[String],
    ) -> Result<Vec<HobbyTag>> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM users.user_hobby_tags WHERE user_hobby_tags.user_id = $1")
            .bind(user_id.to_db())
            .execute(&mut *tx)
            .await?;

        if !names.is_empty() {
            query(
                "
                INSERT INTO users.user_hobby_tags (user_id, hobby_tag_id)
                SELECT $1, hobby_tags.hobby_tag_id
                FROM hobbies.hobby_tags
                WHERE hobby_tags.name = ANY($2)
                ",
            )
            .bind(user_id.to_db())
            .bind(names)
            .execute(&mut *tx)
            .await?;
        }

        let tags = fetch_user_hobby_tags(&mut tx, user_id).await?;
        tx.commit().await?;

        debug!(%user_id, tags = tags.len(), "Replaced user hobby tags");
        Ok(tags)
    }

    pub async fn fetch_user_hobby_tags(&self, user_id: Id<UserMarker>) -> Result<Vec<HobbyTag>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user_hobby_tags(&mut conn, user_id).await
    }

    pub async fn fetch_hobby_tags(&self) -> Result<Vec<HobbyTag>> {
        let records = query_as::<_, HobbyTagRecord>(
            "
            SELECT
                hobby_tags.hobby_tag_id,
                hobby_tags.name
            FROM
                hobbies.hobby_tags
            ORDER BY
                hobby_tags.name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let tags = records
            .into_iter()
            .map(HobbyTag::try_from)
            .collect::<Result<_, _>>()?;
        Ok(tags)
    }

    pub async fn fetch_post_ids(
        &self,
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> Result<Vec<Id<PostMarker>>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "
            SELECT
                posts.post_id
            FROM
                posts.posts
            WHERE
                $1::BIGINT IS NULL OR posts.post_id < $1
            ORDER BY
                posts.post_id DESC
            LIMIT $2
            ",
        )
        .bind(before.map(Id::to_db))
        .bind(page_size.to_db())
        .fetch_all(&self.pool)
        .await?;

        collect_ids(ids)
    }

    pub async fn fetch_post_ids_with_tags(
        &self,
        tags: &[Id<HobbyTagMarker>],
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> Result<Vec<Id<PostMarker>>> {
        let tag_ids: Vec<i64> = tags.iter().copied().map(Id::to_db).collect();

        let ids = sqlx::query_scalar::<_, i64>(
            "
            SELECT
                posts.post_id
            FROM
                posts.posts
            WHERE
                EXISTS (
                    SELECT 1
                    FROM posts.post_hobby_tags
                    WHERE post_hobby_tags.post_id = posts.post_id
                        AND post_hobby_tags.hobby_tag_id = ANY($1)
                )
                AND ($2::BIGINT IS NULL OR posts.post_id < $2)
            ORDER BY
                posts.post_id DESC
            LIMIT $3
            ",
        )
        .bind(tag_ids)
        .bind(before.map(Id::to_db))
        .bind(page_size.to_db())
        .fetch_all(&self.pool)
        .await?;

        collect_ids(ids)
    }

    pub async fn fetch_post_summaries(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<Vec<PostSummary>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        fetch_post_summaries(&mut conn, post_ids).await
    }

    pub async fn fetch_comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<Vec<CommentCount>> {
        let ids: Vec<i64> = post_ids.iter().copied().map(Id::to_db).collect();

        let records = query_as::<_, CommentCountRecord>(
            "
            SELECT
                comments.post_id,
                COUNT(*) AS comment_count
            FROM
                posts.comments
            WHERE
                comments.post_id = ANY($1)
            GROUP BY
                comments.post_id
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let counts = records
            .into_iter()
            .map(CommentCount::try_from)
            .collect::<Result<_, _>>()?;
        Ok(counts)
    }

    pub async fn fetch_user_hobby_tag_ids(
        &self,
        user_id: Id<UserMarker>,
    ) -> Result<Vec<Id<HobbyTagMarker>>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "
            SELECT
                user_hobby_tags.hobby_tag_id
            FROM
                users.user_hobby_tags
            WHERE
                user_hobby_tags.user_id = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        collect_ids(ids)
    }

    pub async fn post_image_exists(&self, image_id: Id<PostImageMarker>) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1
                FROM posts.post_images
                WHERE post_images.post_image_id = $1
            )
            ",
        )
        .bind(image_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

fn collect_ids<Marker>(ids: Vec<i64>) -> Result<Vec<Id<Marker>>> {
    let ids = ids
        .into_iter()
        .map(Id::from_db)
        .collect::<Result<_, _>>()?;
    Ok(ids)
}

pub(crate) async fn fetch_user_hobby_tags(
    conn: &mut PgConnection,
    user_id: Id<UserMarker>,
) -> Result<Vec<HobbyTag>> {
    let records = query_as::<_, HobbyTagRecord>(
        "
        SELECT
            hobby_tags.hobby_tag_id,
            hobby_tags.name
        FROM
            users.user_hobby_tags NATURAL JOIN hobbies.hobby_tags
        WHERE
            user_hobby_tags.user_id = $1
        ORDER BY
            hobby_tags.name
        ",
    )
    .bind(user_id.to_db())
    .fetch_all(&mut *conn)
    .await?;

    let tags = records
        .into_iter()
        .map(HobbyTag::try_from)
        .collect::<Result<_, _>>()?;
    Ok(tags)
}

/// Images of the given posts, grouped by post, each group in upload order.
pub(crate) async fn fetch_post_images(
    conn: &mut PgConnection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<PostImage>>> {
    let records = query_as::<_, PostImageRecord>(
        "
        SELECT
            post_images.post_image_id,
            post_images.post_id,
            post_images.url
        FROM
            posts.post_images
        WHERE
            post_images.post_id = ANY($1)
        ORDER BY
            post_images.post_image_id
        ",
    )
    .bind(post_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut images: HashMap<i64, Vec<PostImage>> = HashMap::new();
    for record in records {
        let post_id = record.post_id;
        images
            .entry(post_id)
            .or_default()
            .push(PostImage::try_from(record)?);
    }

    Ok(images)
}

/// Tags linked to the given posts, grouped by post.
pub(crate) async fn fetch_post_hobby_tags(
    conn: &mut PgConnection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<HobbyTag>>> {
    let records = query_as::<_, PostHobbyTagRecord>(
        "
        SELECT
            post_hobby_tags.post_id,
            hobby_tags.hobby_tag_id,
            hobby_tags.name
        FROM
            posts.post_hobby_tags NATURAL JOIN hobbies.hobby_tags
        WHERE
            post_hobby_tags.post_id = ANY($1)
        ORDER BY
            hobby_tags.name
        ",
    )
    .bind(post_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut tags: HashMap<i64, Vec<HobbyTag>> = HashMap::new();
    for record in records {
        let post_id = record.post_id;
        tags.entry(post_id)
            .or_default()
            .push(HobbyTag::try_from(record)?);
    }

    Ok(tags)
}

async fn fetch_post_summaries(
    conn: &mut PgConnection,
    post_ids: &[Id<PostMarker>],
) -> Result<Vec<PostSummary>> {
    let ids: Vec<i64> = post_ids.iter().copied().map(Id::to_db).collect();

    let records = query_as::<_, PostSummaryRecord>(
        "
        SELECT
            posts.post_id,
            posts.title,
            posts.content,
            posts.created_at,
            users.user_id,
            users.nickname
        FROM
            posts.posts
            JOIN users.users ON users.user_id = posts.user_id
        WHERE
            posts.post_id = ANY($1)
        ORDER BY
            posts.post_id DESC
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut images = fetch_post_images(conn, &ids).await?;
    let mut tags = fetch_post_hobby_tags(conn, &ids).await?;

    let summaries = records
        .into_iter()
        .map(|record| {
            let images = images.remove(&record.post_id).unwrap_or_default();
            let hobby_tags = tags.remove(&record.post_id).unwrap_or_default();
            record.into_summary(images, hobby_tags)
        })
        .collect::<Result<_, _>>()?;

    Ok(summaries)
}

#[async_trait]
impl PostStore for DbClient {
    type Transaction = DbTransaction;

    async fn begin(&self) -> store::Result<DbTransaction> {
        Ok(self.begin_transaction().await?)
    }

    async fn fetch_post_summary(
        &self,
        post_id: Id<PostMarker>,
    ) -> store::Result<Option<PostSummary>> {
        let mut summaries = self.fetch_post_summaries(&[post_id]).await?;
        Ok(summaries.pop())
    }

    async fn fetch_post_ids(
        &self,
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> store::Result<Vec<Id<PostMarker>>> {
        Ok(DbClient::fetch_post_ids(self, before, page_size).await?)
    }

    async fn fetch_post_ids_with_tags(
        &self,
        tags: &[Id<HobbyTagMarker>],
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> store::Result<Vec<Id<PostMarker>>> {
        Ok(DbClient::fetch_post_ids_with_tags(self, tags, before, page_size).await?)
    }

    async fn fetch_post_summaries(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> store::Result<Vec<PostSummary>> {
        Ok(DbClient::fetch_post_summaries(self, post_ids).await?)
    }

    async fn fetch_comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> store::Result<Vec<CommentCount>> {
        Ok(DbClient::fetch_comment_counts(self, post_ids).await?)
    }

    async fn fetch_user_hobby_tag_ids(
        &self,
        user_id: Id<UserMarker>,
    ) -> store::Result<Vec<Id<HobbyTagMarker>>> {
        Ok(DbClient::fetch_user_hobby_tag_ids(self, user_id).await?)
    }

    async fn post_image_exists(&self, image_id: Id<PostImageMarker>) -> store::Result<bool> {
        Ok(DbClient::post_image_exists(self, image_id).await?)
    }
}

#[async_trait]
impl UserStore for DbClient {
    async fn fetch_account_by_email(&self, email: &Email) -> store::Result<Option<Account>> {
        Ok(DbClient::fetch_account_by_email(self, email).await?)
    }

    async fn create_account(&self, account: &CreateAccount) -> store::Result<User> {
        Ok(DbClient::create_account(self, account).await?)
    }

    async fn replace_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
        names: &[String],
    ) -> store::Result<Vec<HobbyTag>> {
        Ok(DbClient::replace_user_hobby_tags(self, user_id, names).await?)
    }

    async fn fetch_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
    ) -> store::Result<Vec<HobbyTag>> {
        Ok(DbClient::fetch_user_hobby_tags(self, user_id).await?)
    }
}

// These run against a scratch database per test:
// `DATABASE_URL=postgres://... cargo test -p hobbyshare-db -- --ignored`
#[cfg(test)]
mod tests {
    use crate::client::DbClient;
    use hobbyshare_common::{
        model::{
            Id,
            auth::{CreateAccount, Email},
            post::{PostContent, PostMarker},
            tag::HobbyTagMarker,
            user::{Nickname, UserMarker},
        },
        util::PageSize,
    };
    use sqlx::PgPool;

    async fn author(db: &DbClient) -> Id<UserMarker> {
        db.create_account(&CreateAccount {
            email: Email::new("alice@example.com".to_owned()).unwrap(),
            nickname: Nickname::new("alice".to_owned()).unwrap(),
            password_hash: "hash".to_owned(),
        })
        .await
        .unwrap()
        .id
    }

    async fn tag_id(db: &DbClient, name: &str) -> Id<HobbyTagMarker> {
        db.fetch_hobby_tags()
            .await
            .unwrap()
            .into_iter()
            .find(|tag| tag.name == name)
            .unwrap()
            .id
    }

    async fn post(
        db: &DbClient,
        author: Id<UserMarker>,
        tags: &[Id<HobbyTagMarker>],
    ) -> Id<PostMarker> {
        let mut tx = db.begin_transaction().await.unwrap();
        let content = PostContent::new("Title".to_owned(), "Words".to_owned()).unwrap();
        let post_id = tx.create_post(author, &content).await.unwrap();
        tx.replace_post_hobby_tags(post_id, tags).await.unwrap();
        tx.commit().await.unwrap();
        post_id
    }

    fn page(size: u32) -> PageSize {
        PageSize::new(size).unwrap()
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn keyset_pages_are_newest_first_without_overlap(pool: PgPool) {
        let db = DbClient::new(pool);
        let author = author(&db).await;
        let mut created = Vec::new();
        for _ in 0..5 {
            created.push(post(&db, author, &[]).await);
        }
        created.reverse();

        let first = db.fetch_post_ids(None, page(2)).await.unwrap();
        let second = db.fetch_post_ids(first.last().copied(), page(2)).await.unwrap();
        let third = db.fetch_post_ids(second.last().copied(), page(2)).await.unwrap();

        assert_eq!(first, created[0..2]);
        assert_eq!(second, created[2..4]);
        assert_eq!(third, created[4..]);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn tag_filtered_pages_match_any_tag_once(pool: PgPool) {
        let db = DbClient::new(pool);
        let author = author(&db).await;
        let climbing = tag_id(&db, "climbing").await;
        let cooking = tag_id(&db, "cooking").await;
        let hiking = tag_id(&db, "hiking").await;

        let both = post(&db, author, &[climbing, cooking]).await;
        post(&db, author, &[hiking]).await;
        let one = post(&db, author, &[cooking]).await;
        post(&db, author, &[]).await;

        let ids = db
            .fetch_post_ids_with_tags(&[climbing, cooking], None, page(10))
            .await
            .unwrap();
        assert_eq!(ids, vec![one, both]);

        let rest = db
            .fetch_post_ids_with_tags(&[climbing, cooking], Some(one), page(10))
            .await
            .unwrap();
        assert_eq!(rest, vec![both]);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL DATABASE_URL"]
    async fn image_rows_disappear_with_their_post(pool: PgPool) {
        let db = DbClient::new(pool);
        let author = author(&db).await;
        let post_id = post(&db, author, &[]).await;

        let mut tx = db.begin_transaction().await.unwrap();
        let image = tx
            .create_post_image(post_id, "https://cdn.example.com/a.png")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(db.post_image_exists(image.id).await.unwrap());

        let mut tx = db.begin_transaction().await.unwrap();
        tx.delete_post(post_id).await.unwrap();
        tx.commit().await.unwrap();
        assert!(!db.post_image_exists(image.id).await.unwrap());
    }
}
