use crate::model::{
    Id,
    tag::HobbyTag,
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_TITLE_MAX_LEN: usize = 100;
pub const POST_CONTENT_MAX_LEN: usize = 5000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostImageMarker;

/// A post as loaded for mutation: owner plus everything the post owns.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Id<UserMarker>,
    pub content: PostContent,
    pub images: Vec<PostImage>,
    pub hobby_tags: Vec<HobbyTag>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PostImage {
    pub id: Id<PostImageMarker>,
    pub post: Id<PostMarker>,
    pub url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct PostContent {
    title: String,
    content: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPostContentError {
    #[error("Post title must be between 1 and {POST_TITLE_MAX_LEN} characters")]
    Title,
    #[error("Post content must be at most {POST_CONTENT_MAX_LEN} characters")]
    Content,
}

impl PostContent {
    pub fn new(title: String, content: String) -> Result<Self, InvalidPostContentError> {
        let title_len = title.trim().chars().count();
        if title_len == 0 || title.chars().count() > POST_TITLE_MAX_LEN {
            return Err(InvalidPostContentError::Title);
        }
        if content.chars().count() > POST_CONTENT_MAX_LEN {
            return Err(InvalidPostContentError::Content);
        }

        Ok(Self { title, content })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Read projection of a post joined with its author, images and tags.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct PostSummary {
    pub id: Id<PostMarker>,
    pub author: User,
    #[serde(flatten)]
    pub content: PostContent,
    pub images: Vec<PostImage>,
    pub hobby_tags: Vec<HobbyTag>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: PostSummary,
    pub comment_count: u64,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct CommentCount {
    pub post: Id<PostMarker>,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use crate::model::post::{InvalidPostContentError, POST_TITLE_MAX_LEN, PostContent};

    #[test]
    fn post_content_validation() {
        let content = PostContent::new("Bouldering".to_owned(), "V3 today".to_owned()).unwrap();
        assert_eq!(content.title(), "Bouldering");
        assert_eq!(content.content(), "V3 today");

        assert!(PostContent::new("Empty body is fine".to_owned(), String::new()).is_ok());

        assert_eq!(
            PostContent::new("   ".to_owned(), "body".to_owned()),
            Err(InvalidPostContentError::Title)
        );
        assert_eq!(
            PostContent::new("t".repeat(POST_TITLE_MAX_LEN + 1), String::new()),
            Err(InvalidPostContentError::Title)
        );
        assert_eq!(
            PostContent::new("title".to_owned(), "c".repeat(5001)),
            Err(InvalidPostContentError::Content)
        );
    }
}
