use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    extract::{PageQuery, Query},
    render::Rendered,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yatube_common::{
    model::{
        post::Post,
        user::{User, Username},
    },
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub(crate) struct ProfilePath {
    pub username: Username,
}

#[derive(Serialize)]
struct ProfilePage {
    author: User,
    post_count: u64,
    page: Page<Post>,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Query(query): Query<PageQuery>,
) -> Result<Rendered<ProfilePage>> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;

    let (page, post_count) = db
        .fetch_post_page(
            PostFilter::Author(author.id),
            settings.posts_on_page,
            query.requested(),
        )
        .await?;

    Ok(Rendered::new(ProfilePage {
        author,
        post_count,
        page,
    }))
}
