use crate::model::user::User;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The email address is invalid: {0:?}")]
pub struct InvalidEmailError(String);

impl Email {
    /// Accepts `local@domain` with a non-empty local part and a dotted domain.
    /// Addresses are compared case-insensitively, so they are stored lowercased.
    pub fn new(email: String) -> Result<Self, InvalidEmailError> {
        let valid = email.len() <= EMAIL_MAX_LEN
            && !email.chars().any(char::is_whitespace)
            && email.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain
                        .split_once('.')
                        .is_some_and(|(head, tail)| !head.is_empty() && !tail.is_empty())
            });

        if valid {
            Ok(Self(email.to_lowercase()))
        } else {
            Err(InvalidEmailError(email))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Email {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Email::new(inner).map_err(|err| D::Error::invalid_value(Unexpected::Str(&err.0), &"Email"))
    }
}

/// Login identity of a user. Only ever handed to the auth layer.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Account {
    pub user: User,
    pub email: Email,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateAccount {
    pub email: Email,
    pub nickname: crate::model::user::Nickname,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl Debug for Account {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("user", &self.user)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

impl Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}
