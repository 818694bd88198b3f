use crate::{server::ServerError, service::auth::AuthService};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use hobbyshare_common::{
    model::{Id, user::{User, UserMarker}},
    token::resolve_access_token,
};
use hobbyshare_db::client::DbClient;

/// The user behind the request's bearer access token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn into_user(self) -> User {
        self.user
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AuthService<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = resolve_access_token(authorization).ok_or(ServerError::MissingCredentials)?;

        let user = AuthService::<DbClient>::from_ref(state)
            .authenticate(token)
            .await?;

        Ok(Self { user })
    }
}
