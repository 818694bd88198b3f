use crate::model::{Id, tag::HobbyTag};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const NICKNAME_MAX_LEN: usize = 30;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub nickname: Nickname,
}

/// A user together with their tag-interest set.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub hobby_tags: Vec<HobbyTag>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Nickname(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The nickname is invalid: {0:?}")]
pub struct InvalidNicknameError(String);

impl Nickname {
    pub fn new(nickname: String) -> Result<Self, InvalidNicknameError> {
        let len = nickname.chars().count();
        if len > 0 && len <= NICKNAME_MAX_LEN && nickname.trim() == nickname {
            Ok(Nickname(nickname))
        } else {
            Err(InvalidNicknameError(nickname))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Nickname {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Nickname::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Nickname"))
    }
}
