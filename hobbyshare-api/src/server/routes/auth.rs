use crate::{
    server::{Result, ServerError, ServerRouter, extract::Json},
    service::auth::{AuthService, LogIn, SignUp},
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use hobbyshare_common::model::auth::TokenPair;
use hobbyshare_db::client::DbClient;
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(sign_up)
        .typed_post(log_in)
        .typed_post(refresh)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup", rejection(ServerError))]
struct SignUpPath();

async fn sign_up(
    SignUpPath(): SignUpPath,
    State(auth): State<AuthService<DbClient>>,
    Json(request): Json<SignUp>,
) -> Result<(StatusCode, Json<TokenPair>)> {
    let tokens = auth.sign_up(request).await?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login", rejection(ServerError))]
struct LogInPath();

async fn log_in(
    LogInPath(): LogInPath,
    State(auth): State<AuthService<DbClient>>,
    Json(request): Json<LogIn>,
) -> Result<Json<TokenPair>> {
    Ok(Json(auth.log_in(request).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/refresh", rejection(ServerError))]
struct RefreshPath();

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    RefreshPath(): RefreshPath,
    State(auth): State<AuthService<DbClient>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    Ok(Json(auth.refresh(&request.refresh_token).await?))
}
