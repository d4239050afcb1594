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
        group::{Group, GroupSlug},
        post::Post,
    },
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub(crate) struct GroupPostsPath {
    pub slug: GroupSlug,
}

#[derive(Serialize)]
struct GroupPostsPage {
    group: Group,
    page: Page<Post>,
}

async fn group_posts(
    GroupPostsPath { slug }: GroupPostsPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Query(query): Query<PageQuery>,
) -> Result<Rendered<GroupPostsPage>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    let (page, _) = db
        .fetch_post_page(
            PostFilter::Group(group.id),
            settings.posts_on_page,
            query.requested(),
        )
        .await?;

    Ok(Rendered::new(GroupPostsPage { group, page }))
}
