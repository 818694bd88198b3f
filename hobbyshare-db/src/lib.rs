pub mod client;
mod record;
pub mod transaction;

use hobbyshare_common::{model::ModelValidationError, store::StoreError};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Data(err) => StoreError::Data(err),
            DbError::Sqlx(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                StoreError::Conflict(err.message().to_owned())
            }
            err => StoreError::Backend(Box::new(err)),
        }
    }
}
