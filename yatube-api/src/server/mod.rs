use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use extract::Json;
use serde::{Deserialize, Serialize};
use std::{num::NonZeroU32, sync::Arc};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use yatube_common::model::{
    Id,
    auth::{AuthTokenHashError, PasswordHashError, TokenLifetime},
    group::GroupSlug,
    post::PostMarker,
    user::Username,
};
use yatube_db::client::{DbClient, DbError};

mod auth;
mod extract;
mod render;
mod routes;
#[cfg(test)]
mod testing;

/// Where requests without a valid token are sent.
pub const LOGIN_PATH: &str = "/auth/login/";

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub settings: Settings,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Settings {
    pub posts_on_page: NonZeroU32,
    pub token_lifetime: Option<TokenLifetime>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete service, ready to be served.
pub fn app(state: ServerState) -> Router {
    routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authentication required to access {next}")]
    AuthenticationRequired { next: String },
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
    #[error("User with username {0} was not found.")]
    UserByUsernameNotFound(Username),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::GroupBySlugNotFound(_)
            | ServerError::UserByUsernameNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::AuthenticationRequired { .. } => StatusCode::SEE_OTHER,
            ServerError::QueryRejection(_) | ServerError::JsonRejection(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `/auth/login/?next=<path>` for a request to `next`. Slashes stay readable.
pub fn login_redirect(next: &str) -> Redirect {
    let next = urlencoding::encode(next).replace("%2F", "/");
    Redirect::to(&format!("{LOGIN_PATH}?next={next}"))
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ServerError::AuthenticationRequired { next } = &self {
            debug!(next = %next, "Redirecting to login");
            return login_redirect(next).into_response();
        }

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Replying with error");
        }

        let error_response = ErrorResponse {
            status: status.as_u16(),
        };
        (status, Json(error_response)).into_response()
    }
}
