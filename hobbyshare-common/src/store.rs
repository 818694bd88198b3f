//! Persistence seams used by the services.
//!
//! Reads go through the store directly. Writes that must be all-or-nothing go
//! through a [`PostTransaction`], which rolls back when dropped without
//! [`PostTransaction::commit`].

use crate::model::{
    Id, ModelValidationError,
    auth::{Account, CreateAccount, Email},
    post::{CommentCount, Post, PostContent, PostImage, PostMarker, PostImageMarker, PostSummary},
    tag::{HobbyTag, HobbyTagMarker},
    user::{User, UserMarker},
};
use crate::util::PageSize;
use async_trait::async_trait;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A unique constraint was violated: {0}")]
    Conflict(String),
    #[error("Store backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait PostStore: Send + Sync + 'static {
    type Transaction: PostTransaction;

    async fn begin(&self) -> Result<Self::Transaction>;

    async fn fetch_post_summary(&self, post_id: Id<PostMarker>) -> Result<Option<PostSummary>>;

    /// Newest post ids first, strictly below `before` when given.
    async fn fetch_post_ids(
        &self,
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> Result<Vec<Id<PostMarker>>>;

    /// Like [`Self::fetch_post_ids`], restricted to posts linked to at least one of `tags`.
    async fn fetch_post_ids_with_tags(
        &self,
        tags: &[Id<HobbyTagMarker>],
        before: Option<Id<PostMarker>>,
        page_size: PageSize,
    ) -> Result<Vec<Id<PostMarker>>>;

    /// Hydrates posts in one batch, newest first. Unknown ids are skipped.
    async fn fetch_post_summaries(&self, post_ids: &[Id<PostMarker>]) -> Result<Vec<PostSummary>>;

    /// Only posts with at least one comment are returned.
    async fn fetch_comment_counts(&self, post_ids: &[Id<PostMarker>]) -> Result<Vec<CommentCount>>;

    async fn fetch_user_hobby_tag_ids(&self, user_id: Id<UserMarker>)
    -> Result<Vec<Id<HobbyTagMarker>>>;

    /// Whether the image row is still committed, so its bytes are worth storing.
    async fn post_image_exists(&self, image_id: Id<PostImageMarker>) -> Result<bool>;
}

#[async_trait]
pub trait PostTransaction: Send + Sized {
    async fn fetch_post(&mut self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_post(
        &mut self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<Id<PostMarker>>;

    async fn update_post_content(
        &mut self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<()>;

    /// Removes the post together with its images and tag links.
    async fn delete_post(&mut self, post_id: Id<PostMarker>) -> Result<()>;

    async fn create_post_image(&mut self, post_id: Id<PostMarker>, url: &str) -> Result<PostImage>;

    async fn delete_post_image(&mut self, image_id: Id<PostImageMarker>) -> Result<()>;

    /// Names without a matching tag are dropped.
    async fn fetch_hobby_tags_by_names(&mut self, names: &[String]) -> Result<Vec<HobbyTag>>;

    async fn replace_post_hobby_tags(
        &mut self,
        post_id: Id<PostMarker>,
        tags: &[Id<HobbyTagMarker>],
    ) -> Result<()>;

    async fn commit(self) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn fetch_account_by_email(&self, email: &Email) -> Result<Option<Account>>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_account(&self, account: &CreateAccount) -> Result<User>;

    /// Replaces the user's tag-interest set with the tags matching `names`.
    async fn replace_user_hobby_tags(
        &self,
        user_id: Id<UserMarker>,
        names: &[String],
    ) -> Result<Vec<HobbyTag>>;

    async fn fetch_user_hobby_tags(&self, user_id: Id<UserMarker>) -> Result<Vec<HobbyTag>>;
}
