//! WindGo Chat API server binary.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use windgo_api::config::ApiConfig;
use windgo_core::auth::sessions::{NONCE_SWEEP_INTERVAL, spawn_nonce_sweeper};
use windgo_core::clock::{Clock, SystemClock};
use windgo_core::store::memory::MemoryStore;
use windgo_core::store::postgres::PgStore;
use windgo_core::store::{ChatStore, CredentialStore};

/// CLI arguments for the API server. Unset values fall back to the
/// environment read by [`ApiConfig::from_env`].
#[derive(Parser, Debug)]
#[command(name = "windgo_api_server", about = "WindGo Chat API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Keep all state in memory instead of PostgreSQL. Data is lost on exit.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,windgo_api=debug,windgo_core=debug")
                }),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env();
    if let Some(addr) = args.bind_addr {
        config.bind_addr = addr;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    let (credentials, chat): (Arc<dyn CredentialStore>, Arc<dyn ChatStore>) = if args.in_memory {
        warn!("using the in-memory store; nothing will be persisted");
        let store = Arc::new(MemoryStore::seeded());
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let chat: Arc<dyn ChatStore> = store;
        (credentials, chat)
    } else {
        info!(max_connections = args.max_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;
        let store = Arc::new(PgStore::new(pool));
        info!("running database migrations");
        store.migrate().await?;
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let chat: Arc<dyn ChatStore> = store;
        (credentials, chat)
    };

    if config.github.is_none() {
        info!("GitHub OAuth is not configured; GitHub login routes are disabled");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    spawn_nonce_sweeper(credentials.clone(), clock.clone(), NONCE_SWEEP_INTERVAL);

    let bind_addr = config.bind_addr.clone();
    let state = windgo_api::AppState::new(credentials, chat, clock, config)?;
    let app = windgo_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}
