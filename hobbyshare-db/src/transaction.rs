use crate::{
    Result,
    client::{fetch_post_hobby_tags, fetch_post_images},
    record::{HobbyTagRecord, PostImageRecord, PostRecord},
};
use async_trait::async_trait;
use hobbyshare_common::{
    model::{
        Id,
        post::{Post, PostContent, PostImage, PostImageMarker, PostMarker},
        tag::{HobbyTag, HobbyTagMarker},
        user::UserMarker,
    },
    store::{self, PostTransaction},
};
use sqlx::{Postgres, Transaction, query, query_as, query_scalar};
use std::fmt::{Debug, Formatter};

/// A write transaction. Dropping it without [`DbTransaction::commit`] rolls back.
pub struct DbTransaction {
    tx: Transaction<'static, Postgres>,
}

impl Debug for DbTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction").finish_non_exhaustive()
    }
}

impl DbTransaction {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    /// Loads and row-locks a post with its images and tags.
    pub async fn fetch_post(&mut self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let Some(record) = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_id,
                posts.user_id,
                posts.title,
                posts.content
            FROM
                posts.posts
            WHERE
                posts.post_id = $1
            FOR UPDATE
            ",
        )
        .bind(post_id.to_db())
        .fetch_optional(&mut *self.tx)
        .await?
        else {
            return Ok(None);
        };

        let ids = [record.post_id];
        let images = fetch_post_images(&mut self.tx, &ids)
            .await?
            .remove(&record.post_id)
            .unwrap_or_default();
        let hobby_tags = fetch_post_hobby_tags(&mut self.tx, &ids)
            .await?
            .remove(&record.post_id)
            .unwrap_or_default();

        Ok(Some(Post {
            id: post_id,
            author: Id::from_db(record.user_id)?,
            content: record.content()?,
            images,
            hobby_tags,
        }))
    }

    pub async fn create_post(
        &mut self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts.posts (user_id, title, content)
            VALUES ($1, $2, $3)
            RETURNING posts.post_id
            ",
        )
        .bind(author.to_db())
        .bind(content.title())
        .bind(content.content())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Id::from_db(post_id)?)
    }

    pub async fn update_post_content(
        &mut self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<()> {
        query(
            "
            UPDATE posts.posts
            SET title = $2, content = $3, updated_at = now()
            WHERE posts.post_id = $1
            ",
        )
        .bind(post_id.to_db())
        .bind(content.title())
        .bind(content.content())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn delete_post(&mut self, post_id: Id<PostMarker>) -> Result<()> {
        query("DELETE FROM posts.posts WHERE posts.post_id = $1")
            .bind(post_id.to_db())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    pub async fn create_post_image(
        &mut self,
        post_id: Id<PostMarker>,
        url: &str,
    ) -> Result<PostImage> {
        let record = query_as::<_, PostImageRecord>(
            "
            INSERT INTO posts.post_images (post_id, url)
            VALUES ($1, $2)
            RETURNING post_images.post_image_id, post_images.post_id, post_images.url
            ",
        )
        .bind(post_id.to_db())
        .bind(url)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(PostImage::try_from(record)?)
    }

    pub async fn delete_post_image(&mut self, image_id: Id<PostImageMarker>) -> Result<()> {
        query("DELETE FROM posts.post_images WHERE post_images.post_image_id = $1")
            .bind(image_id.to_db())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    pub async fn fetch_hobby_tags_by_names(&mut self, names: &[String]) -> Result<Vec<HobbyTag>> {
        let records = query_as::<_, HobbyTagRecord>(
            "
            SELECT
                hobby_tags.hobby_tag_id,
                hobby_tags.name
            FROM
                hobbies.hobby_tags
            WHERE
                hobby_tags.name = ANY($1)
            ORDER BY
                hobby_tags.hobby_tag_id
            ",
        )
        .bind(names)
        .fetch_all(&mut *self.tx)
        .await?;

        let tags = records
            .into_iter()
            .map(HobbyTag::try_from)
            .collect::<Result<_, _>>()?;
        Ok(tags)
    }

    pub async fn replace_post_hobby_tags(
        &mut self,
        post_id: Id<PostMarker>,
        tags: &[Id<HobbyTagMarker>],
    ) -> Result<()> {
        query("DELETE FROM posts.post_hobby_tags WHERE post_hobby_tags.post_id = $1")
            .bind(post_id.to_db())
            .execute(&mut *self.tx)
            .await?;

        if tags.is_empty() {
            return Ok(());
        }

        let tag_ids: Vec<i64> = tags.iter().copied().map(Id::to_db).collect();
        query(
            "
            INSERT INTO posts.post_hobby_tags (post_id, hobby_tag_id)
            SELECT $1, tag_id FROM UNNEST($2::BIGINT[]) AS tag_id
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(post_id.to_db())
        .bind(tag_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PostTransaction for DbTransaction {
    async fn fetch_post(&mut self, post_id: Id<PostMarker>) -> store::Result<Option<Post>> {
        Ok(DbTransaction::fetch_post(self, post_id).await?)
    }

    async fn create_post(
        &mut self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> store::Result<Id<PostMarker>> {
        Ok(DbTransaction::create_post(self, author, content).await?)
    }

    async fn update_post_content(
        &mut self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> store::Result<()> {
        Ok(DbTransaction::update_post_content(self, post_id, content).await?)
    }

    async fn delete_post(&mut self, post_id: Id<PostMarker>) -> store::Result<()> {
        Ok(DbTransaction::delete_post(self, post_id).await?)
    }

    async fn create_post_image(
        &mut self,
        post_id: Id<PostMarker>,
        url: &str,
    ) -> store::Result<PostImage> {
        Ok(DbTransaction::create_post_image(self, post_id, url).await?)
    }

    async fn delete_post_image(&mut self, image_id: Id<PostImageMarker>) -> store::Result<()> {
        Ok(DbTransaction::delete_post_image(self, image_id).await?)
    }

    async fn fetch_hobby_tags_by_names(
        &mut self,
        names: &[String],
    ) -> store::Result<Vec<HobbyTag>> {
        Ok(DbTransaction::fetch_hobby_tags_by_names(self, names).await?)
    }

    async fn replace_post_hobby_tags(
        &mut self,
        post_id: Id<PostMarker>,
        tags: &[Id<HobbyTagMarker>],
    ) -> store::Result<()> {
        Ok(DbTransaction::replace_post_hobby_tags(self, post_id, tags).await?)
    }

    async fn commit(self) -> store::Result<()> {
        Ok(DbTransaction::commit(self).await?)
    }
}
