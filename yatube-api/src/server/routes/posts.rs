use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::AuthenticatedUser,
    extract::{Json, PageQuery, Query},
    render::Rendered,
    routes::profiles::ProfilePath,
};
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use yatube_common::{
    model::{
        Id,
        form::FormErrors,
        group::Group,
        post::{CreatePost, Post, PostForm, PostMarker},
    },
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(post_detail)
        .typed_get(create_post_form)
        .typed_post(create_post)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
}

#[derive(TypedPath)]
#[typed_path("/")]
struct IndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
pub(crate) struct PostDetailPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath)]
#[typed_path("/create/")]
struct CreatePostPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
struct EditPostPath {
    id: Id<PostMarker>,
}

#[derive(Serialize)]
struct IndexPage {
    page: Page<Post>,
}

#[derive(Serialize)]
struct PostDetailPage {
    post: Post,
    post_count: u64,
}

#[derive(Serialize)]
struct PostFormPage {
    form: PostForm,
    errors: FormErrors,
    groups: Vec<Group>,
    is_edit: bool,
}

fn detail_redirect(id: Id<PostMarker>) -> Redirect {
    Redirect::to(&PostDetailPath { id }.to_string())
}

async fn index(
    IndexPath: IndexPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Query(query): Query<PageQuery>,
) -> Result<Rendered<IndexPage>> {
    let (page, _) = db
        .fetch_post_page(PostFilter::All, settings.posts_on_page, query.requested())
        .await?;

    Ok(Rendered::new(IndexPage { page }))
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Rendered<PostDetailPage>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let post_count = db.count_posts(PostFilter::Author(post.author.id)).await?;

    Ok(Rendered::new(PostDetailPage { post, post_count }))
}

async fn create_post_form(
    CreatePostPath: CreatePostPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Rendered<PostFormPage>> {
    Ok(Rendered::new(PostFormPage {
        form: PostForm::default(),
        errors: FormErrors::new(),
        groups: db.fetch_groups().await?,
        is_edit: false,
    }))
}

async fn create_post(
    CreatePostPath: CreatePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Response> {
    let groups = db.fetch_groups().await?;

    let content = match form.clean(&groups) {
        Ok(content) => content,
        Err(errors) => {
            return Ok(Rendered::new(PostFormPage {
                form,
                errors,
                groups,
                is_edit: false,
            })
            .into_response());
        }
    };

    let post_id = db
        .create_post(&CreatePost {
            author: user.user_id(),
            content,
        })
        .await?;
    info!(%post_id, author = %user.user().username, "Created post");

    let profile = ProfilePath {
        username: user.user().username.clone(),
    };
    Ok(Redirect::to(&profile.to_string()).into_response())
}

async fn edit_post_form(
    EditPostPath { id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.author.id != user.user_id() {
        return Ok(detail_redirect(id).into_response());
    }

    Ok(Rendered::new(PostFormPage {
        form: PostForm::from_post(&post),
        errors: FormErrors::new(),
        groups: db.fetch_groups().await?,
        is_edit: true,
    })
    .into_response())
}

async fn edit_post(
    EditPostPath { id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Response> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.author.id != user.user_id() {
        info!(post_id = %id, user = %user.user().username, "Refused edit by non-author");
        return Ok(detail_redirect(id).into_response());
    }

    let groups = db.fetch_groups().await?;
    let content = match form.clean(&groups) {
        Ok(content) => content,
        Err(errors) => {
            return Ok(Rendered::new(PostFormPage {
                form,
                errors,
                groups,
                is_edit: true,
            })
            .into_response());
        }
    };

    if !db.update_post(id, &content).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }
    info!(post_id = %id, "Edited post");

    Ok(detail_redirect(id).into_response())
}

#[cfg(test)]
mod tests {
    use crate::server::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;
    use yatube_common::model::form::{INVALID_CHOICE, REQUIRED};

    #[tokio::test]
    async fn index_is_newest_first_and_paginated() {
        let app = TestApp::new().await;
        let (author, _) = app.user("auth").await;
        let cats = app.group("cats").await;

        for i in 0..13 {
            app.post(author.id, &format!("post {i}"), Some(cats.id)).await;
        }

        let response = app.get("/", None).await;
        assert_eq!(response.status, StatusCode::OK);
        let page = &response.body["page"];
        assert_eq!(page["count"], 13);
        assert_eq!(page["number"], 1);
        assert_eq!(page["num_pages"], 2);
        assert_eq!(page["items"].as_array().unwrap().len(), 10);
        assert_eq!(page["items"][0]["text"], "post 12");
        assert_eq!(page["items"][0]["author"]["username"], "auth");
        assert_eq!(page["items"][0]["group"]["slug"], "cats");

        let response = app.get("/?page=2", None).await;
        assert_eq!(response.body["page"]["items"].as_array().unwrap().len(), 3);

        for junk in ["/?page=0", "/?page=abc", "/?page="] {
            let response = app.get(junk, None).await;
            assert_eq!(response.status, StatusCode::OK, "{junk}");
            assert_eq!(response.body["page"]["number"], 1, "{junk}");
        }
        assert_eq!(app.get("/?page=50", None).await.body["page"]["number"], 2);
    }

    #[tokio::test]
    async fn every_page_carries_year() {
        let app = TestApp::new().await;
        let (author, _) = app.user("auth").await;
        let post = app.post(author.id, "text", None).await;

        for path in [
            "/".to_owned(),
            format!("/posts/{post}/"),
            "/profile/auth/".to_owned(),
        ] {
            let response = app.get(&path, None).await;
            assert_eq!(
                response.body["year"],
                time::OffsetDateTime::now_utc().year(),
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn detail_shows_post_and_author_count() {
        let app = TestApp::new().await;
        let (author, _) = app.user("auth").await;
        let (other, _) = app.user("other").await;
        let post = app.post(author.id, "first", None).await;
        app.post(author.id, "second", None).await;
        app.post(other.id, "elsewhere", None).await;

        let response = app.get(&format!("/posts/{post}/"), None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["post"]["id"], post.get());
        assert_eq!(response.body["post"]["text"], "first");
        assert_eq!(response.body["post_count"], 2);
    }

    #[tokio::test]
    async fn unknown_or_malformed_post_is_not_found() {
        let app = TestApp::new().await;

        assert_eq!(app.get("/posts/404/", None).await.status, StatusCode::NOT_FOUND);
        assert_eq!(app.get("/posts/abc/", None).await.status, StatusCode::NOT_FOUND);
        assert_eq!(
            app.get("/no/such/route/", None).await.status,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn anonymous_writes_redirect_to_login() {
        let app = TestApp::new().await;
        let (author, _) = app.user("auth").await;
        let post = app.post(author.id, "text", None).await;
        let edit = format!("/posts/{post}/edit/");

        for path in ["/create/", edit.as_str()] {
            let response = app.get(path, None).await;
            assert_eq!(response.status, StatusCode::SEE_OTHER);
            assert_eq!(response.login_next().as_deref(), Some(path));
            assert_eq!(
                response.location(),
                Some(format!("/auth/login/?next={path}").as_str())
            );

            let response = app.post_json(path, None, &json!({ "text": "sneaky" })).await;
            assert_eq!(response.status, StatusCode::SEE_OTHER);
            assert_eq!(response.login_next().as_deref(), Some(path));
        }

        let response = app
            .get("/create/", Some("1:bm90LWEtdG9rZW4=:c2FsdA=="))
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.login_next().as_deref(), Some("/create/"));

        assert_eq!(app.db.count_posts(Default::default()).await.unwrap(), 1);
        assert_eq!(app.post_text(post).await, "text");
    }

    #[tokio::test]
    async fn create_form_lists_groups() {
        let app = TestApp::new().await;
        let (_, token) = app.user("auth").await;
        app.group("cats").await;

        let response = app.get("/create/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["is_edit"], false);
        assert_eq!(response.body["form"]["text"], "");
        assert_eq!(response.body["groups"][0]["slug"], "cats");
    }

    #[tokio::test]
    async fn create_sets_author_from_token() {
        let app = TestApp::new().await;
        let (author, token) = app.user("auth").await;
        let (other, _) = app.user("other").await;
        let cats = app.group("cats").await;

        let response = app
            .post_json(
                "/create/",
                Some(&token),
                &json!({ "text": "  new post  ", "group": cats.id, "author": other.id }),
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/profile/auth/"));

        let response = app.get("/profile/auth/", None).await;
        assert_eq!(response.body["post_count"], 1);
        let created = &response.body["page"]["items"][0];
        assert_eq!(created["text"], "new post");
        assert_eq!(created["author"]["id"], author.id.get());
        assert_eq!(created["group"]["id"], cats.id.get());

        assert_eq!(app.get("/profile/other/", None).await.body["post_count"], 0);
    }

    #[tokio::test]
    async fn invalid_create_rerenders_form() {
        let app = TestApp::new().await;
        let (_, token) = app.user("auth").await;

        let response = app
            .post_json("/create/", Some(&token), &json!({ "text": "   ", "group": 77 }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["errors"]["text"], json!([REQUIRED]));
        assert_eq!(response.body["errors"]["group"], json!([INVALID_CHOICE]));
        assert_eq!(response.body["form"]["group"], 77);
        assert_eq!(response.body["is_edit"], false);

        assert_eq!(app.db.count_posts(Default::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_author_edit_redirects_to_detail() {
        let app = TestApp::new().await;
        let (author, _) = app.user("auth").await;
        let (_, intruder_token) = app.user("intruder").await;
        let cats = app.group("cats").await;
        let post = app.post(author.id, "original", Some(cats.id)).await;
        let edit = format!("/posts/{post}/edit/");

        let response = app.get(&edit, Some(&intruder_token)).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some(format!("/posts/{post}/").as_str()));

        let response = app
            .post_json(&edit, Some(&intruder_token), &json!({ "text": "defaced" }))
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some(format!("/posts/{post}/").as_str()));

        let stored = app.db.fetch_post(post).await.unwrap().unwrap();
        assert_eq!(stored.text, "original");
        assert_eq!(stored.group.map(|group| group.id), Some(cats.id));
    }

    #[tokio::test]
    async fn author_edit_updates_only_content() {
        let app = TestApp::new().await;
        let (author, token) = app.user("auth").await;
        let cats = app.group("cats").await;
        let dogs = app.group("dogs").await;
        let post = app.post(author.id, "original", Some(cats.id)).await;
        let untouched = app.post(author.id, "untouched", Some(cats.id)).await;
        let edit = format!("/posts/{post}/edit/");

        let response = app.get(&edit, Some(&token)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["is_edit"], true);
        assert_eq!(response.body["form"]["text"], "original");
        assert_eq!(response.body["form"]["group"], cats.id.get());

        let response = app
            .post_json(&edit, Some(&token), &json!({ "text": "edited", "group": dogs.id }))
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some(format!("/posts/{post}/").as_str()));

        let stored = app.db.fetch_post(post).await.unwrap().unwrap();
        assert_eq!(stored.id, post);
        assert_eq!(stored.text, "edited");
        assert_eq!(stored.author.id, author.id);
        assert_eq!(stored.group.map(|group| group.id), Some(dogs.id));

        assert_eq!(app.post_text(untouched).await, "untouched");
    }

    #[tokio::test]
    async fn invalid_edit_keeps_stored_post() {
        let app = TestApp::new().await;
        let (author, token) = app.user("auth").await;
        let post = app.post(author.id, "original", None).await;

        let response = app
            .post_json(&format!("/posts/{post}/edit/"), Some(&token), &json!({ "text": "" }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["is_edit"], true);
        assert_eq!(response.body["errors"]["text"], json!([REQUIRED]));

        assert_eq!(app.post_text(post).await, "original");
    }

    #[tokio::test]
    async fn editing_missing_post_is_not_found() {
        let app = TestApp::new().await;
        let (_, token) = app.user("auth").await;

        let response = app.get("/posts/404/edit/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn form_encoded_values_are_accepted() {
        let app = TestApp::new().await;
        let (author, token) = app.user("auth").await;
        let cats = app.group("cats").await;

        let response = app
            .post_json(
                "/create/",
                Some(&token),
                &json!({ "text": "hi", "group": cats.id.to_string() }),
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        let created = app.get("/profile/auth/", None).await;
        assert_eq!(created.body["page"]["items"][0]["group"]["slug"], "cats");

        let response = app
            .post_json("/create/", Some(&token), &json!({ "text": null, "group": "cats" }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["errors"]["text"], json!([REQUIRED]));
        assert_eq!(response.body["errors"]["group"], json!([INVALID_CHOICE]));
        assert_eq!(response.body["form"]["group"], "cats");

        let post = app.post(author.id, "original", None).await;
        let (_, intruder_token) = app.user("intruder").await;
        let response = app
            .post_json(
                &format!("/posts/{post}/edit/"),
                Some(&intruder_token),
                &json!({ "text": null, "group": [1] }),
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some(format!("/posts/{post}/").as_str()));

        assert_eq!(app.db.count_posts(Default::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn non_object_body_is_bad_request() {
        let app = TestApp::new().await;
        let (_, token) = app.user("auth").await;

        let response = app
            .post_json("/create/", Some(&token), &json!("just text"))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["status"], 400);
    }
}
