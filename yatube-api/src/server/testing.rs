//! In-process harness for driving the router in tests.

use crate::server::{LOGIN_PATH, ServerState, Settings, app};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::Value;
use std::{num::NonZeroU32, sync::Arc};
use tower::ServiceExt;
use yatube_common::model::{
    Id,
    auth::AuthToken,
    group::{CreateGroup, Group, GroupMarker, GroupSlug, GroupTitle},
    post::{CreatePost, PostContent, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use yatube_db::client::DbClient;

pub struct TestApp {
    pub db: Arc<DbClient>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|location| location.to_str().ok())
    }

    /// The decoded `next` of a redirect to the login page.
    pub fn login_next(&self) -> Option<String> {
        let query = self
            .location()?
            .strip_prefix(LOGIN_PATH)?
            .strip_prefix("?next=")?;

        urlencoding::decode(query).ok().map(|next| next.into_owned())
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Arc::new(DbClient::in_memory().await.unwrap());
        let state = ServerState {
            db_client: db.clone(),
            settings: Settings {
                posts_on_page: NonZeroU32::new(10).unwrap(),
                token_lifetime: None,
            },
        };

        Self {
            db,
            router: app(state),
        }
    }

    /// Creates a user and a bearer token for them.
    pub async fn user(&self, username: &str) -> (User, String) {
        let username = Username::new(username.to_owned()).unwrap();
        let id = self
            .db
            .create_user(&CreateUser {
                username: username.clone(),
                password_hash: "$argon2id$unusable".to_owned(),
            })
            .await
            .unwrap();

        let token = AuthToken::generate_random(id);
        self.db
            .create_auth(&token.hash().unwrap(), id, None)
            .await
            .unwrap();

        (User { id, username }, token.as_token_str())
    }

    pub async fn group(&self, slug: &str) -> Group {
        let slug = GroupSlug::new(slug.to_owned()).unwrap();
        self.db
            .upsert_group(&CreateGroup {
                title: GroupTitle::new(format!("Group {slug}")).unwrap(),
                slug: slug.clone(),
                description: String::new(),
            })
            .await
            .unwrap();

        self.db.fetch_group_by_slug(&slug).await.unwrap().unwrap()
    }

    pub async fn post(
        &self,
        author: Id<UserMarker>,
        text: &str,
        group: Option<Id<GroupMarker>>,
    ) -> Id<PostMarker> {
        self.db
            .create_post(&CreatePost {
                author,
                content: PostContent {
                    text: text.to_owned(),
                    group,
                },
            })
            .await
            .unwrap()
    }

    pub async fn post_text(&self, post: Id<PostMarker>) -> String {
        self.db.fetch_post(post).await.unwrap().unwrap().text
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Self::request("GET", uri, token).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: &Value) -> TestResponse {
        let request = Self::request("POST", uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
