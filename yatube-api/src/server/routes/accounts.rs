//! Signup, login and logout.
//!
//! Logging in hands out a bearer token instead of a session cookie. Password
//! change and reset are not offered.

use crate::server::{
    Result, ServerRouter, Settings,
    auth::AuthenticatedUser,
    extract::{Json, Query},
    render::Rendered,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use yatube_common::model::{
    auth::{AuthToken, hash_password, verify_password, verify_password_without_account},
    form::{FormErrors, NON_FIELD_ERRORS},
    user::{CreateUser, LoginForm, SignupForm, User, Username},
};
use yatube_db::client::{DbClient, DbError};

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
        .typed_post(logout)
}

#[derive(TypedPath)]
#[typed_path("/auth/signup/")]
struct SignupPath;

#[derive(TypedPath)]
#[typed_path("/auth/login/")]
struct LoginPath;

#[derive(TypedPath)]
#[typed_path("/auth/logout/")]
struct LogoutPath;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Serialize)]
struct SignupPage {
    form: SignupForm,
    errors: FormErrors,
}

#[derive(Serialize)]
struct LoginPage {
    form: LoginForm,
    errors: FormErrors,
    next: Option<String>,
}

#[derive(Serialize)]
struct TokenPage {
    token: String,
    user: User,
    next: Option<String>,
}

#[derive(Serialize)]
struct LoggedOutPage {}

async fn issue_token(db: &DbClient, settings: Settings, user: &User) -> Result<String> {
    let token = AuthToken::generate_random(user.id);
    db.create_auth(&token.hash()?, user.id, settings.token_lifetime)
        .await?;

    Ok(token.as_token_str())
}

async fn signup_form(SignupPath: SignupPath) -> Rendered<SignupPage> {
    Rendered::new(SignupPage {
        form: SignupForm::default(),
        errors: FormErrors::new(),
    })
}

async fn signup(
    SignupPath: SignupPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Json(form): Json<SignupForm>,
) -> Result<Response> {
    let rerender = |form: SignupForm, errors: FormErrors| -> Result<Response> {
        Ok(Rendered::new(SignupPage { form, errors }).into_response())
    };

    let data = match form.clean() {
        Ok(data) => data,
        Err(errors) => return rerender(form, errors),
    };

    let new_user = CreateUser {
        username: data.username,
        password_hash: hash_password(&data.password)?,
    };
    let user_id = match db.create_user(&new_user).await {
        Ok(user_id) => user_id,
        Err(DbError::UsernameTaken(_)) => {
            return rerender(form, FormErrors::new().with("username", USERNAME_TAKEN));
        }
        Err(err) => return Err(err.into()),
    };

    let user = User {
        id: user_id,
        username: new_user.username,
    };
    info!(user = %user.username, "Signed up");

    let token = issue_token(&db, settings, &user).await?;
    Ok(Rendered::new(TokenPage {
        token,
        user,
        next: None,
    })
    .into_response())
}

async fn login_form(LoginPath: LoginPath, Query(query): Query<LoginQuery>) -> Rendered<LoginPage> {
    Rendered::new(LoginPage {
        form: LoginForm::default(),
        errors: FormErrors::new(),
        next: query.next,
    })
}

async fn login(
    LoginPath: LoginPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Query(query): Query<LoginQuery>,
    Json(form): Json<LoginForm>,
) -> Result<Response> {
    if let Err(errors) = form.clean() {
        return Ok(Rendered::new(LoginPage {
            form,
            errors,
            next: query.next,
        })
        .into_response());
    }

    let credentials = match Username::new(form.username.trim().to_owned()) {
        Ok(username) => db.fetch_credentials(&username).await?,
        Err(_) => None,
    };

    let user = match credentials {
        Some((user, password_hash)) => {
            verify_password(&form.password, &password_hash)?.then_some(user)
        }
        None => {
            verify_password_without_account(&form.password)?;
            None
        }
    };

    let user = match user {
        Some(user) => user,
        None => {
            return Ok(Rendered::new(LoginPage {
                form,
                errors: FormErrors::new().with(NON_FIELD_ERRORS, INVALID_LOGIN),
                next: query.next,
            })
            .into_response());
        }
    };
    info!(user = %user.username, "Logged in");

    let token = issue_token(&db, settings, &user).await?;
    Ok(Rendered::new(TokenPage {
        token,
        user,
        next: query.next,
    })
    .into_response())
}

async fn logout(
    LogoutPath: LogoutPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Rendered<LoggedOutPage>> {
    db.delete_auth(user.token_hash()).await?;
    info!(user = %user.user().username, "Logged out");

    Ok(Rendered::new(LoggedOutPage {}))
}
