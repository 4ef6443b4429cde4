//! Mugmatch Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::session_store::{SessionStore, memory::MemorySessionStore};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    match env::var("MONGO_URI") {
        Ok(uri) => start_mongo_supervisor(app_state.clone(), uri),
        Err(_) => {
            info!("no MONGO_URI set; using in-memory storage");
            install_memory_store(&app_state).await?;
        }
    }

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Hand the MongoDB connection over to the storage supervisor, which retries
/// in the background and toggles degraded mode when connectivity changes.
#[cfg(feature = "mongo-store")]
fn start_mongo_supervisor(state: SharedState, uri: String) {
    use dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

    let db_name = env::var("MONGO_DB").ok();
    let connect_state = state.clone();

    tokio::spawn(services::storage_supervisor::run(state, move || {
        let state = connect_state.clone();
        let uri = uri.clone();
        let db_name = db_name.clone();

        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store: Arc<dyn SessionStore> = Arc::new(MongoSessionStore::connect(config).await?);
            store.seed_people(state.config().fixture_people()).await?;
            Ok(store)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
fn start_mongo_supervisor(state: SharedState, _uri: String) {
    use tracing::{error, warn};

    warn!("MONGO_URI is set but the mongo-store feature is disabled; using in-memory storage");
    tokio::spawn(async move {
        if let Err(err) = install_memory_store(&state).await {
            error!(error = %err, "failed to install the in-memory store");
        }
    });
}

/// Install a seeded in-memory store and leave degraded mode.
async fn install_memory_store(state: &SharedState) -> anyhow::Result<()> {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    store
        .seed_people(state.config().fixture_people())
        .await
        .context("seeding the in-memory roster")?;
    state.install_session_store(store).await;
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
