use crate::server::{Result, ServerError, ServerRouter, extract::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use hobbyshare_common::model::tag::HobbyTag;
use hobbyshare_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_hobby_tags)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/hobby-tags", rejection(ServerError))]
struct HobbyTagsPath();

async fn get_hobby_tags(
    HobbyTagsPath(): HobbyTagsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<HobbyTag>>> {
    Ok(Json(db.fetch_hobby_tags().await?))
}
