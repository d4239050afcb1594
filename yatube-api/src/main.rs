use serde::Deserialize;
use server::{ServerState, Settings};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_common::model::{
    auth::{NonPositiveLifetimeError, TokenLifetime},
    group::CreateGroup,
};
use yatube_db::client::{DbClient, DbError};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid TOKEN_LIFETIME_SECONDS: {0}")]
    TokenLifetime(#[from] NonPositiveLifetimeError),
    #[error("Error setting up database: {0}")]
    Database(#[from] DbError),
    #[error("Error reading group fixtures {0}: {1}")]
    FixturesRead(PathBuf, std::io::Error),
    #[error("Error parsing group fixtures {0}: {1}")]
    FixturesParse(PathBuf, serde_json::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_posts_on_page")]
    posts_on_page: NonZeroU32,
    token_lifetime_seconds: Option<i64>,
    group_fixtures: Option<PathBuf>,
}

fn default_database_url() -> String {
    "sqlite://yatube.db".to_owned()
}

fn default_posts_on_page() -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(9)
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,\
                yatube_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

/// Creates or refreshes the groups listed in a JSON fixture file.
async fn load_group_fixtures(db: &DbClient, path: &Path) -> Result<(), InitError> {
    let fixtures = std::fs::read_to_string(path)
        .map_err(|err| InitError::FixturesRead(path.to_owned(), err))?;
    let groups: Vec<CreateGroup> = serde_json::from_str(&fixtures)
        .map_err(|err| InitError::FixturesParse(path.to_owned(), err))?;

    for group in &groups {
        db.upsert_group(group).await?;
    }
    info!(count = groups.len(), path = %path.display(), "Loaded group fixtures");

    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down");
                    shutdown.cancel();
                }
                Err(err) => error!(%err, "Could not listen for ctrl-c"),
            }
        }
    });

    shutdown
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let token_lifetime = env
        .token_lifetime_seconds
        .map(|seconds| TokenLifetime::try_from(Duration::seconds(seconds)))
        .transpose()?;

    let db_client = Arc::new(DbClient::connect(&env.database_url).await?);
    if let Some(path) = &env.group_fixtures {
        load_group_fixtures(&db_client, path).await?;
    }

    let app = server::app(ServerState {
        db_client,
        settings: Settings {
            posts_on_page: env.posts_on_page,
            token_lifetime,
        },
    });

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
