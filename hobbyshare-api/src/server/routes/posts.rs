use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, PostForm, Query},
    },
    service::posts::{CreatePost, FeedQuery, PostService, UpdatePost},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use hobbyshare_common::{
    model::{
        Id,
        post::{PostContent, PostMarker, PostView},
    },
    util::PageSize,
};
use hobbyshare_db::client::DbClient;
use serde::{Deserialize, Serialize};

/// Upper bound for a whole multipart post body.
const MAX_POST_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
        .layer(DefaultBodyLimit::max(MAX_POST_BODY_BYTES))
}

type Posts = PostService<DbClient>;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(Deserialize)]
struct FeedParams {
    #[serde(default)]
    tag_filter: bool,
    last_post_id: Option<Id<PostMarker>>,
    page_size: Option<u32>,
}

async fn get_posts(
    PostsPath(): PostsPath,
    user: AuthenticatedUser,
    State(posts): State<Posts>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<PostView>>> {
    let page_size = params
        .page_size
        .map(PageSize::try_from)
        .transpose()?
        .unwrap_or_default();

    let feed = posts
        .find_posts_infinite_scroll(
            user.user_id(),
            FeedQuery {
                filter_by_tags: params.tag_filter,
                last_post_id: params.last_post_id,
                page_size,
            },
        )
        .await?;

    Ok(Json(feed))
}

async fn get_post(
    PostPath { id }: PostPath,
    _: AuthenticatedUser,
    State(posts): State<Posts>,
) -> Result<Json<PostView>> {
    Ok(Json(posts.find_post(id).await?))
}

#[derive(Deserialize)]
struct CreatePostRequest {
    title: String,
    content: String,
    #[serde(default)]
    hobby_tag_names: Vec<String>,
}

#[derive(Copy, Clone, Debug, Serialize)]
struct CreatedPost {
    id: Id<PostMarker>,
}

async fn create_post(
    PostsPath(): PostsPath,
    user: AuthenticatedUser,
    State(posts): State<Posts>,
    form: PostForm<CreatePostRequest>,
) -> Result<(StatusCode, Json<CreatedPost>)> {
    let PostForm { request, images } = form;

    let id = posts
        .create(
            user.user_id(),
            CreatePost {
                content: PostContent::new(request.title, request.content)?,
                hobby_tag_names: request.hobby_tag_names,
                images,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedPost { id })))
}

#[derive(Deserialize)]
struct UpdatePostRequest {
    title: String,
    content: String,
    #[serde(default)]
    deleted_image_urls: Vec<String>,
    #[serde(default)]
    hobby_tag_names: Vec<String>,
}

async fn update_post(
    PostPath { id }: PostPath,
    user: AuthenticatedUser,
    State(posts): State<Posts>,
    form: PostForm<UpdatePostRequest>,
) -> Result<StatusCode> {
    let PostForm { request, images } = form;

    posts
        .update(
            user.user_id(),
            id,
            UpdatePost {
                content: PostContent::new(request.title, request.content)?,
                deleted_image_urls: request.deleted_image_urls,
                hobby_tag_names: request.hobby_tag_names,
                images,
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_post(
    PostPath { id }: PostPath,
    user: AuthenticatedUser,
    State(posts): State<Posts>,
) -> Result<StatusCode> {
    posts.delete(user.user_id(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}
