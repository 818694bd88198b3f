use hobbyshare_common::model::{
    Id, ModelValidationError,
    auth::{Account, Email},
    post::{CommentCount, PostContent, PostImage, PostSummary},
    tag::HobbyTag,
    user::{Nickname, User},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub nickname: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AccountRecord {
    pub user_id: i64,
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostSummaryRecord {
    pub post_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub user_id: i64,
    pub nickname: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostImageRecord {
    pub post_image_id: i64,
    pub post_id: i64,
    pub url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct HobbyTagRecord {
    pub hobby_tag_id: i64,
    pub name: String,
}

/// A tag link row joined with the tag it points at.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostHobbyTagRecord {
    pub post_id: i64,
    pub hobby_tag_id: i64,
    pub name: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentCountRecord {
    pub post_id: i64,
    pub comment_count: i64,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_id)?,
            nickname: Nickname::new(value.nickname)?,
        })
    }
}

impl TryFrom<AccountRecord> for Account {
    type Error = ModelValidationError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: User {
                id: Id::from_db(value.user_id)?,
                nickname: Nickname::new(value.nickname)?,
            },
            email: Email::new(value.email)?,
            password_hash: value.password_hash,
        })
    }
}

impl TryFrom<PostImageRecord> for PostImage {
    type Error = ModelValidationError;

    fn try_from(value: PostImageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_image_id)?,
            post: Id::from_db(value.post_id)?,
            url: value.url,
        })
    }
}

impl TryFrom<HobbyTagRecord> for HobbyTag {
    type Error = ModelValidationError;

    fn try_from(value: HobbyTagRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.hobby_tag_id)?,
            name: value.name,
        })
    }
}

impl TryFrom<PostHobbyTagRecord> for HobbyTag {
    type Error = ModelValidationError;

    fn try_from(value: PostHobbyTagRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.hobby_tag_id)?,
            name: value.name,
        })
    }
}

impl TryFrom<CommentCountRecord> for CommentCount {
    type Error = ModelValidationError;

    fn try_from(value: CommentCountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            post: Id::from_db(value.post_id)?,
            count: value.comment_count.max(0).cast_unsigned(),
        })
    }
}

impl PostRecord {
    pub fn content(&self) -> Result<PostContent, ModelValidationError> {
        Ok(PostContent::new(self.title.clone(), self.content.clone())?)
    }
}

impl PostSummaryRecord {
    pub fn into_summary(
        self,
        images: Vec<PostImage>,
        hobby_tags: Vec<HobbyTag>,
    ) -> Result<PostSummary, ModelValidationError> {
        Ok(PostSummary {
            id: Id::from_db(self.post_id)?,
            author: User {
                id: Id::from_db(self.user_id)?,
                nickname: Nickname::new(self.nickname)?,
            },
            content: PostContent::new(self.title, self.content)?,
            images,
            hobby_tags,
            created_at: self.created_at,
        })
    }
}
