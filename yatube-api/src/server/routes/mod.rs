use crate::server::ServerRouter;

mod accounts;
mod groups;
mod posts;
mod profiles;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(accounts::routes())
}
