use crate::{
    events::{image_event_channel, spawn_image_upload_worker},
    server::ServerState,
    service::{auth::AuthService, posts::PostService},
    storage::LocalObjectStorage,
};
use hobbyshare_common::{
    storage::{ObjectStorage, StorageError},
    token::{TokenConfig, TokenError, TokenService},
    util::{NonPositiveDurationError, PositiveDuration},
};
use hobbyshare_db::{DbError, client::DbClient};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod events;
mod server;
mod service;
mod storage;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid token lifetime: {0}")]
    TokenTtl(#[from] NonPositiveDurationError),
    #[error("Invalid token configuration: {0}")]
    TokenConfig(#[from] TokenError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error setting up object storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_jwt_access_ttl_seconds() -> i64 {
    60 * 60
}

fn default_jwt_refresh_ttl_seconds() -> i64 {
    14 * 24 * 60 * 60
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    jwt_secret: String,
    #[serde(default = "default_jwt_access_ttl_seconds")]
    jwt_access_ttl_seconds: i64,
    #[serde(default = "default_jwt_refresh_ttl_seconds")]
    jwt_refresh_ttl_seconds: i64,
    storage_root: PathBuf,
    storage_public_url: String,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_access_ttl_seconds", &self.jwt_access_ttl_seconds)
            .field("jwt_refresh_ttl_seconds", &self.jwt_refresh_ttl_seconds)
            .field("storage_root", &self.storage_root)
            .field("storage_public_url", &self.storage_public_url)
            .finish_non_exhaustive()
    }
}

impl Env {
    fn token_config(&self) -> Result<TokenConfig, InitError> {
        let config = TokenConfig {
            secret: self.jwt_secret.clone(),
            access_ttl: PositiveDuration::from_seconds(self.jwt_access_ttl_seconds)?,
            refresh_ttl: PositiveDuration::from_seconds(self.jwt_refresh_ttl_seconds)?,
        };
        config.check_lifetimes()?;

        Ok(config)
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hobbyshare_api=debug,\
                hobbyshare_db=debug,\
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

/// Cancels `token` on Ctrl-C.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(err) => error!(error = %err, "Could not listen for Ctrl-C, shutting down"),
        }
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;
    debug!(?env, "Loaded environment");

    let token_service = Arc::new(TokenService::new(&env.token_config()?));

    let db_client = Arc::new(DbClient::connect(&env.database_url, env.database_max_connections).await?);
    db_client.migrate().await?;

    let storage: Arc<dyn ObjectStorage> = Arc::new(
        LocalObjectStorage::new(env.storage_root.clone(), &env.storage_public_url).await?,
    );
    let (image_events, image_receiver) = image_event_channel();
    let worker = spawn_image_upload_worker(
        Arc::clone(&db_client),
        Arc::clone(&storage),
        image_receiver,
    );

    let state = ServerState {
        posts: PostService::new(Arc::clone(&db_client), storage, image_events),
        auth: AuthService::new(Arc::clone(&db_client), token_service),
        db_client: Arc::clone(&db_client),
    };
    let app = server::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    // The router, and with it the last event sender, is gone once serve returns.
    if let Err(err) = worker.await {
        error!(error = %err, "Image upload worker panicked");
    }
    db_client.close().await;

    info!("Shut down");
    Ok(())
}
