use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;
use yatube_common::model::{
    Id,
    auth::{AuthToken, AuthTokenHash},
    user::{User, UserMarker},
};
use yatube_db::client::DbClient;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user behind a valid bearer token.
///
/// Rejects with [`ServerError::AuthenticationRequired`] when the token is missing,
/// malformed, unknown or expired, so that the client is sent to log in.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
    token_hash: AuthTokenHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn token_hash(&self) -> &AuthTokenHash {
        &self.token_hash
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |path| path.as_str().to_owned());

        let Ok(TypedHeader(Authorization(bearer))) =
            AuthorizationHeader::from_request_parts(parts, state).await
        else {
            debug!(next = %next, "No bearer token presented");
            return Err(ServerError::AuthenticationRequired { next });
        };

        let Ok(request_token) = bearer.token().parse::<AuthToken>() else {
            debug!(next = %next, "Bearer token could not be decoded");
            return Err(ServerError::AuthenticationRequired { next });
        };

        let token_hash = request_token.hash()?;

        let authentication = Arc::<DbClient>::from_ref(state)
            .fetch_auth(&token_hash)
            .await?
            .filter(|authentication| authentication.user.id == request_token.user_id);

        let Some(authentication) = authentication else {
            debug!(next = %next, "Bearer token is unknown");
            return Err(ServerError::AuthenticationRequired { next });
        };

        if authentication.is_expired_at(OffsetDateTime::now_utc()) {
            debug!(next = %next, user = %authentication.user.username, "Bearer token expired");
            return Err(ServerError::AuthenticationRequired { next });
        }

        Ok(Self {
            user: authentication.user,
            token_hash,
        })
    }
}
