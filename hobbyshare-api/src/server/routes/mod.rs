use crate::server::ServerRouter;

mod auth;
mod posts;
mod tags;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(auth::routes())
        .merge(tags::routes())
        .merge(users::routes())
        .merge(posts::routes())
}
