//! Password sign-up and login, token refresh and bearer authentication.

use hobbyshare_common::{
    model::{
        auth::{Account, CreateAccount, Email, TokenPair},
        user::{Nickname, User},
    },
    password::{PasswordHashError, hash_password, verify_password},
    store::{StoreError, UserStore},
    token::{TokenError, TokenKind, TokenService},
};
use serde::Deserialize;
use std::{fmt::Debug, ops::RangeInclusive, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PASSWORD_LEN: RangeInclusive<usize> = 8..=64;

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown email or wrong password")]
    InvalidCredentials,
    #[error("The email address is already registered")]
    EmailTaken,
    #[error("Passwords must be between 8 and 64 characters")]
    InvalidPassword,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(_) => Self::EmailTaken,
            other => Self::Store(other),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct SignUp {
    pub email: Email,
    pub password: String,
    pub nickname: Nickname,
    #[serde(default)]
    pub hobby_tag_names: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct LogIn {
    pub email: Email,
    pub password: String,
}

impl Debug for SignUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUp")
            .field("email", &self.email)
            .field("nickname", &self.nickname)
            .field("hobby_tag_names", &self.hobby_tag_names)
            .finish_non_exhaustive()
    }
}

impl Debug for LogIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIn")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct AuthService<U> {
    users: Arc<U>,
    tokens: Arc<TokenService>,
}

impl<U> Clone for AuthService<U> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<U: UserStore> AuthService<U> {
    pub fn new(users: Arc<U>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }

    pub async fn sign_up(&self, request: SignUp) -> Result<TokenPair> {
        if !PASSWORD_LEN.contains(&request.password.chars().count()) {
            return Err(AuthError::InvalidPassword);
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .users
            .create_account(&CreateAccount {
                email: request.email.clone(),
                nickname: request.nickname,
                password_hash,
            })
            .await?;

        // The account already exists, so interests are best-effort from here on.
        if !request.hobby_tag_names.is_empty() {
            if let Err(err) = self
                .users
                .replace_user_hobby_tags(user.id, &request.hobby_tag_names)
                .await
            {
                warn!(user_id = %user.id, error = %err, "Could not store hobby tags of new user");
            }
        }

        info!(user_id = %user.id, "Signed up new user");
        self.issue_tokens(&request.email)
    }

    pub async fn log_in(&self, request: LogIn) -> Result<TokenPair> {
        let Some(account) = self.users.fetch_account_by_email(&request.email).await? else {
            debug!("Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&request.password, &account.password_hash)? {
            debug!(user_id = %account.user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %account.user.id, "User logged in");
        self.issue_tokens(&account.email)
    }

    /// Trades a refresh token for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let account = self.account_for(refresh_token, TokenKind::Refresh).await?;

        debug!(user_id = %account.user.id, "Refreshed tokens");
        self.issue_tokens(&account.email)
    }

    /// Resolves the user behind an access token.
    pub async fn authenticate(&self, access_token: &str) -> Result<User> {
        Ok(self.account_for(access_token, TokenKind::Access).await?.user)
    }

    async fn account_for(&self, token: &str, kind: TokenKind) -> Result<Account> {
        let claims = self.tokens.validate_token_kind(token, kind)?;
        let email = Email::new(claims.sub).map_err(|_| TokenError::Invalid)?;

        self.users
            .fetch_account_by_email(&email)
            .await?
            .ok_or(AuthError::Token(TokenError::Invalid))
    }

    fn issue_tokens(&self, email: &Email) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.tokens.create_access_token(email.get())?,
            refresh_token: self.tokens.create_refresh_token(email.get())?,
        })
    }
}
