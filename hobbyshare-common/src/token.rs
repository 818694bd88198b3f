//! Signed session tokens.
//!
//! Tokens are HS256 JWTs whose subject is the user's email. Access and refresh
//! tokens share the same shape and differ in lifetime and in the `typ` claim.

use crate::util::PositiveDuration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::{Duration, UtcDateTime};

const BEARER_PREFIX: &str = "Bearer ";

/// Longest accepted token lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::days(366);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum TokenError {
    #[error("The token has expired")]
    Expired,
    #[error("The token is invalid")]
    Invalid,
    #[error("The token could not be signed: {0}")]
    Signing(String),
    #[error("The token lifetime {0} is out of range")]
    Lifetime(Duration),
}

#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: PositiveDuration,
    pub refresh_ttl: PositiveDuration,
}

impl TokenConfig {
    /// Fails with [`TokenError::Lifetime`] when a TTL exceeds [`MAX_TOKEN_TTL`].
    pub fn check_lifetimes(&self) -> Result<(), TokenError> {
        for ttl in [self.access_ttl.get(), self.refresh_ttl.get()] {
            if ttl > MAX_TOKEN_TTL {
                return Err(TokenError::Lifetime(ttl));
            }
        }
        Ok(())
    }
}

impl Debug for TokenConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[redacted]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: PositiveDuration,
    refresh_ttl: PositiveDuration,
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn create_access_token(&self, email: &str) -> Result<String, TokenError> {
        self.create_token_at(
            email,
            TokenKind::Access,
            UtcDateTime::now(),
            self.access_ttl.get(),
        )
    }

    pub fn create_refresh_token(&self, email: &str) -> Result<String, TokenError> {
        self.create_token_at(
            email,
            TokenKind::Refresh,
            UtcDateTime::now(),
            self.refresh_ttl.get(),
        )
    }

    pub fn create_token_at(
        &self,
        email: &str,
        kind: TokenKind,
        issued_at: UtcDateTime,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let expires_at = issued_at
            .checked_add(ttl)
            .ok_or(TokenError::Lifetime(ttl))?;
        let claims = Claims {
            sub: email.to_owned(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            typ: kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Verifies signature and expiry.
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Like [`Self::validate_token`], additionally rejecting tokens of the other kind.
    pub fn validate_token_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.validate_token(token)?;
        if claims.typ == kind {
            Ok(claims)
        } else {
            Err(TokenError::Invalid)
        }
    }

    pub fn email_from_token(&self, token: &str) -> Result<String, TokenError> {
        self.validate_token(token).map(|claims| claims.sub)
    }
}

/// Extracts the credential from an `Authorization` header value of the exact
/// form `Bearer <token>`.
#[must_use]
pub fn resolve_access_token(authorization: Option<&str>) -> Option<&str> {
    authorization?.strip_prefix(BEARER_PREFIX)
}
