use crate::service::{auth::AuthError, auth::AuthService, posts::PostError, posts::PostService};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hobbyshare_common::{
    model::post::InvalidPostContentError, token::TokenError, util::InvalidPageSizeError,
};
use hobbyshare_db::{DbError, client::DbClient};
use extract::Json;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

mod auth;
mod extract;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub posts: PostService<DbClient>,
    pub auth: AuthService<DbClient>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("The multipart body has no `request` part")]
    MissingRequestPart,
    #[error("The `request` part is not valid JSON: {0}")]
    InvalidRequestPart(serde_json::Error),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("No bearer token was provided")]
    MissingCredentials,
    #[error(transparent)]
    InvalidPageSize(#[from] InvalidPageSizeError),
    #[error(transparent)]
    InvalidPost(#[from] InvalidPostContentError),
    #[error(transparent)]
    Post(#[from] PostError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] DbError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::MissingRequestPart
            | ServerError::InvalidRequestPart(_)
            | ServerError::InvalidPageSize(_)
            | ServerError::InvalidPost(_) => StatusCode::BAD_REQUEST,
            ServerError::MissingCredentials => StatusCode::UNAUTHORIZED,
            ServerError::JsonResponse(_) | ServerError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Post(err) => match err {
                PostError::PostNotFound(_) => StatusCode::NOT_FOUND,
                PostError::Forbidden { .. } => StatusCode::FORBIDDEN,
                PostError::FileUploadFailed | PostError::Store(_) | PostError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::Auth(err) => match err {
                AuthError::Token(TokenError::Signing(_) | TokenError::Lifetime(_))
                | AuthError::Store(_)
                | AuthError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::InvalidCredentials | AuthError::Token(_) => StatusCode::UNAUTHORIZED,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::InvalidPassword => StatusCode::BAD_REQUEST,
            },
        }
    }

    /// Stable machine-readable error code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => "NOT_FOUND",
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::MissingRequestPart
            | ServerError::InvalidRequestPart(_) => "INVALID_REQUEST",
            ServerError::InvalidPageSize(_) => "INVALID_PAGE_SIZE",
            ServerError::InvalidPost(_) => "INVALID_POST",
            ServerError::MissingCredentials => "MISSING_CREDENTIALS",
            ServerError::Post(PostError::PostNotFound(_)) => "POST_NOT_FOUND",
            ServerError::Post(PostError::Forbidden { .. }) => "FORBIDDEN",
            ServerError::Post(PostError::FileUploadFailed) => "FILE_UPLOAD_FAILED",
            ServerError::Auth(AuthError::InvalidCredentials) => "INVALID_CREDENTIALS",
            ServerError::Auth(AuthError::EmailTaken) => "EMAIL_TAKEN",
            ServerError::Auth(AuthError::InvalidPassword) => "INVALID_PASSWORD",
            ServerError::Auth(AuthError::Token(TokenError::Expired)) => "EXPIRED_TOKEN",
            ServerError::Auth(AuthError::Token(TokenError::Invalid)) => "INVALID_TOKEN",
            ServerError::JsonResponse(_)
            | ServerError::Auth(AuthError::Token(TokenError::Signing(_) | TokenError::Lifetime(_)))
            | ServerError::Database(_)
            | ServerError::Post(PostError::Store(_) | PostError::Storage(_))
            | ServerError::Auth(AuthError::Store(_) | AuthError::PasswordHash(_)) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            error!(error = %self, %status, code, "Replying with error");
        } else {
            warn!(error = %self, %status, code, "Replying with error");
        }

        let error_response = ErrorResponse {
            status: status.as_u16(),
            code,
        };
        (status, Json(error_response)).into_response()
    }
}
