use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, extract::Json,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use hobbyshare_common::model::{tag::HobbyTag, user::UserProfile};
use hobbyshare_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_me)
        .typed_put(put_my_hobby_tags)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/me", rejection(ServerError))]
struct MePath();

async fn get_me(
    MePath(): MePath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<UserProfile>> {
    let hobby_tags = db.fetch_user_hobby_tags(user.user_id()).await?;

    Ok(Json(UserProfile {
        user: user.into_user(),
        hobby_tags,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/me/hobby-tags", rejection(ServerError))]
struct MyHobbyTagsPath();

#[derive(Deserialize)]
struct HobbyTagNames {
    hobby_tag_names: Vec<String>,
}

async fn put_my_hobby_tags(
    MyHobbyTagsPath(): MyHobbyTagsPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(request): Json<HobbyTagNames>,
) -> Result<Json<Vec<HobbyTag>>> {
    let tags = db
        .replace_user_hobby_tags(user.user_id(), &request.hobby_tag_names)
        .await?;

    info!(user_id = %user.user_id(), tags = tags.len(), "Replaced hobby tags");
    Ok(Json(tags))
}
