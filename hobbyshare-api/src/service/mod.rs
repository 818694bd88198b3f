//! Business rules behind the HTTP routes.

pub mod auth;
pub mod posts;

#[cfg(test)]
pub mod testing;
