//! Post writes and feed reads.
//!
//! Every write runs in one store transaction. Image rows are inserted inside
//! that transaction while the image bytes travel to object storage through
//! [`ImageUploadEvent`]s that are only published once the transaction commits.
//! When any image step fails, every object name reserved so far is deleted
//! from storage before the write is abandoned.

use crate::events::{ImageEventSender, ImageUploadEvent, publish_image_events};
use hobbyshare_common::{
    model::{
        Id,
        post::{Post, PostContent, PostMarker, PostView, PostSummary},
        tag::HobbyTagMarker,
        user::UserMarker,
    },
    storage::{ImageFile, ObjectStorage, StorageError},
    store::{PostStore, PostTransaction, StoreError},
    util::PageSize,
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub type Result<T, E = PostError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("Post {0} was not found")]
    PostNotFound(Id<PostMarker>),
    #[error("User {actor} may not modify post {post}")]
    Forbidden {
        post: Id<PostMarker>,
        actor: Id<UserMarker>,
    },
    #[error("Uploading the post images failed")]
    FileUploadFailed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
enum ImageStepError {
    #[error("{0:?} is not an image")]
    NotAnImage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CreatePost {
    pub content: PostContent,
    pub hobby_tag_names: Vec<String>,
    pub images: Vec<ImageFile>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UpdatePost {
    pub content: PostContent,
    /// URLs of existing images to remove. URLs the post does not own are ignored.
    pub deleted_image_urls: Vec<String>,
    /// Replaces the whole tag set. An empty list clears it.
    pub hobby_tag_names: Vec<String>,
    pub images: Vec<ImageFile>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct FeedQuery {
    /// Only posts sharing a tag with the reader's interests.
    pub filter_by_tags: bool,
    /// Cursor from the previous page. `None` or id `0` starts at the newest post.
    pub last_post_id: Option<Id<PostMarker>>,
    pub page_size: PageSize,
}

/// Fails unless `actor` wrote `post`.
pub fn assert_owner(post: &Post, actor: Id<UserMarker>) -> Result<()> {
    if post.author == actor {
        Ok(())
    } else {
        Err(PostError::Forbidden {
            post: post.id,
            actor,
        })
    }
}

#[derive(Debug)]
pub struct PostService<S> {
    store: Arc<S>,
    storage: Arc<dyn ObjectStorage>,
    image_events: ImageEventSender,
}

impl<S> Clone for PostService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            storage: Arc::clone(&self.storage),
            image_events: self.image_events.clone(),
        }
    }
}

impl<S: PostStore> PostService<S> {
    pub fn new(
        store: Arc<S>,
        storage: Arc<dyn ObjectStorage>,
        image_events: ImageEventSender,
    ) -> Self {
        Self {
            store,
            storage,
            image_events,
        }
    }

    pub async fn create(&self, author: Id<UserMarker>, request: CreatePost) -> Result<Id<PostMarker>> {
        let mut tx = self.store.begin().await?;

        let post_id = tx.create_post(author, &request.content).await?;
        let events = upload_images(self.storage.as_ref(), &mut tx, post_id, request.images).await?;
        if !request.hobby_tag_names.is_empty() {
            replace_hobby_tags(&mut tx, post_id, &request.hobby_tag_names).await?;
        }

        tx.commit().await?;

        info!(%post_id, %author, images = events.len(), "Created post");
        publish_image_events(&self.image_events, events);

        Ok(post_id)
    }

    pub async fn update(
        &self,
        actor: Id<UserMarker>,
        post_id: Id<PostMarker>,
        request: UpdatePost,
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let post = tx
            .fetch_post(post_id)
            .await?
            .ok_or(PostError::PostNotFound(post_id))?;
        assert_owner(&post, actor)?;

        tx.update_post_content(post_id, &request.content).await?;

        let mut removed = 0_usize;
        for image in &post.images {
            if !request.deleted_image_urls.contains(&image.url) {
                continue;
            }

            self.storage
                .delete_object(self.storage.object_key(&image.url))
                .await?;
            tx.delete_post_image(image.id).await?;
            removed += 1;
        }

        let events = upload_images(self.storage.as_ref(), &mut tx, post_id, request.images).await?;
        replace_hobby_tags(&mut tx, post_id, &request.hobby_tag_names).await?;

        tx.commit().await?;

        info!(%post_id, %actor, removed, added = events.len(), "Updated post");
        publish_image_events(&self.image_events, events);

        Ok(())
    }

    pub async fn delete(&self, actor: Id<UserMarker>, post_id: Id<PostMarker>) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let post = tx
            .fetch_post(post_id)
            .await?
            .ok_or(PostError::PostNotFound(post_id))?;
        assert_owner(&post, actor)?;

        for image in &post.images {
            self.storage
                .delete_object(self.storage.object_key(&image.url))
                .await?;
        }
        tx.delete_post(post_id).await?;

        tx.commit().await?;

        info!(%post_id, %actor, images = post.images.len(), "Deleted post");
        Ok(())
    }

    pub async fn find_post(&self, post_id: Id<PostMarker>) -> Result<PostView> {
        let summary = self
            .store
            .fetch_post_summary(post_id)
            .await?
            .ok_or(PostError::PostNotFound(post_id))?;
        let counts = self.fetch_comment_counts(&[post_id]).await?;

        Ok(with_comment_count(summary, &counts))
    }

    /// One feed page, newest first.
    pub async fn find_posts_infinite_scroll(
        &self,
        reader: Id<UserMarker>,
        query: FeedQuery,
    ) -> Result<Vec<PostView>> {
        let before = query.last_post_id.filter(|id| id.get() != 0);

        let post_ids = if query.filter_by_tags {
            let tags = self.store.fetch_user_hobby_tag_ids(reader).await?;
            self.fetch_tagged_post_ids(&tags, before, query.page_size)
                .await?
        } else {
            self.store.fetch_post_ids(before, query.page_size).await?
        };

        if post_ids.is_empty() {
            debug!(%reader, filter_by_tags = query.filter_by_tags, "Feed page is empty");
            return Ok(Vec::new());
        }

        let summaries = self.store.fetch_post_summaries(&post_ids).await?;
        let counts = self.fetch_comment_counts(&post_ids).await?;

        debug!(
            %reader,
            filter_by_tags = query.filter_by_tags,
            posts = summaries.len(),
            "Loaded feed page"
        );

        Ok(summaries
            .into_iter()
            .map(|summary| with_comment_count(summary, &counts))
            .collect())
    }

    async fn fetch_tagged_post_ids(
        &self,
        tags: &[Id<HobbyTagMarker>],
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> Result<Vec<Id<PostMarker>>> {
        // A reader without interests matches nothing.
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .store
            .fetch_post_ids_with_tags(tags, before, page_size)
            .await?)
    }

    async fn fetch_comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        Ok(self
            .store
            .fetch_comment_counts(post_ids)
            .await?
            .into_iter()
            .map(|count| (count.post, count.count))
            .collect())
    }
}

fn with_comment_count(post: PostSummary, counts: &HashMap<Id<PostMarker>, u64>) -> PostView {
    let comment_count = counts.get(&post.id).copied().unwrap_or(0);
    PostView {
        post,
        comment_count,
    }
}

async fn replace_hobby_tags<T: PostTransaction>(
    tx: &mut T,
    post_id: Id<PostMarker>,
    names: &[String],
) -> Result<()> {
    let tags = if names.is_empty() {
        Vec::new()
    } else {
        tx.fetch_hobby_tags_by_names(names)
            .await?
            .into_iter()
            .map(|tag| tag.id)
            .collect()
    };

    if tags.len() < names.len() {
        debug!(%post_id, requested = names.len(), found = tags.len(), "Ignoring unknown hobby tags");
    }

    tx.replace_post_hobby_tags(post_id, &tags).await?;
    Ok(())
}

/// Inserts an image row per file and returns the events that store their bytes.
/// On the first failure, every object reserved by this call is deleted again.
async fn upload_images<T: PostTransaction>(
    storage: &dyn ObjectStorage,
    tx: &mut T,
    post_id: Id<PostMarker>,
    files: Vec<ImageFile>,
) -> Result<Vec<ImageUploadEvent>> {
    let mut uploaded_urls = Vec::with_capacity(files.len());
    let mut events = Vec::with_capacity(files.len());

    for file in files {
        match upload_image(storage, tx, post_id, file, &mut uploaded_urls).await {
            Ok(event) => events.push(event),
            Err(err) => {
                warn!(%post_id, error = %err, reserved = uploaded_urls.len(), "Image upload failed, rolling back");
                delete_uploaded(storage, &uploaded_urls).await;
                return Err(PostError::FileUploadFailed);
            }
        }
    }

    Ok(events)
}

async fn upload_image<T: PostTransaction>(
    storage: &dyn ObjectStorage,
    tx: &mut T,
    post_id: Id<PostMarker>,
    file: ImageFile,
    uploaded_urls: &mut Vec<String>,
) -> Result<ImageUploadEvent, ImageStepError> {
    if !file.is_image() {
        return Err(ImageStepError::NotAnImage(file.file_name));
    }

    let name = storage.generate_unique_name(&file.file_name);
    let url = storage.url_for(&name);
    // Recorded before the insert so a failing image is cleaned up too.
    uploaded_urls.push(url.clone());

    let image = tx.create_post_image(post_id, &url).await?;

    Ok(ImageUploadEvent {
        image_id: image.id,
        file_name: name,
        data: file.data,
    })
}

async fn delete_uploaded(storage: &dyn ObjectStorage, urls: &[String]) {
    for url in urls {
        let key = storage.object_key(url);
        if let Err(err) = storage.delete_object(key).await {
            error!(%key, error = %err, "Could not delete uploaded image");
        }
    }
}
