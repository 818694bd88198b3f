pub mod auth;
pub mod post;
pub mod tag;
pub mod user;

use crate::{
    model::{
        auth::InvalidEmailError,
        post::InvalidPostContentError, user::InvalidNicknameError,
    },
    util::NonPositiveDurationError,
};
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData, str::FromStr};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    Nickname(#[from] InvalidNicknameError),
    #[error(transparent)]
    PostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error("Id was negative: {0}")]
    NegativeId(i64),
}

/// Database-assigned identifier, tagged with the kind of entity it points at.
///
/// Ids are allocated from ascending sequences, so ordering by id is ordering by
/// insertion. The feed relies on this for keyset pagination.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(u64, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Value as stored in a `BIGINT` column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.cast_signed()
    }

    pub fn from_db(value: i64) -> Result<Self, ModelValidationError> {
        u64::try_from(value)
            .map(Self::new)
            .map_err(|_| ModelValidationError::NegativeId(value))
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::new)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(value)
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, ModelValidationError, post::PostMarker};

    #[test]
    fn db_conversion() {
        let id = Id::<PostMarker>::from_db(42).unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_db(), 42);

        assert_eq!(
            Id::<PostMarker>::from_db(-1),
            Err(ModelValidationError::NegativeId(-1))
        );
    }

    #[test]
    fn ordering_follows_value() {
        let older = Id::<PostMarker>::new(7);
        let newer = Id::<PostMarker>::new(12);
        assert!(older < newer);
        assert_eq!("12".parse::<Id<PostMarker>>(), Ok(newer));
    }
}
