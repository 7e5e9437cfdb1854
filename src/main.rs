#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else, clippy::module_name_repetitions)]

use crate::{
    config::RuntimeConfiguration,
    state::AppState,
    store::{MemoryStore, PostgresStore, Store},
};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};

#[macro_use]
extern crate tracing;

mod config;
mod data;
mod error;
mod logging;
mod request_log;
mod routes;
mod state;
mod store;

/// Waits for a stop signal. A listener that cannot be installed just never fires.
async fn stop_requested() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(?e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(?e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

async fn shutdown(state: AppState) {
    let signal = stop_requested().await;
    warn!(signal, "Shutting down, closing the store");
    state.sensible_shutdown().await;
}

async fn open_store(config: &RuntimeConfiguration) -> Arc<dyn Store> {
    let db_config = config.db_config();
    if db_config.is_memory() {
        warn!("Using the in-memory store, nothing will be persisted");
        return Arc::new(MemoryStore::new());
    }

    let options = PgPoolOptions::new()
        .max_connections(15)
        .acquire_timeout(Duration::from_secs(3));
    let store = PostgresStore::connect_lazy(options, db_config.url().expose_secret())
        .expect("unable to create database pool");

    // an unreachable database is reported by /health/detailed rather than stopping startup
    match store.migrate().await {
        Ok(()) => info!("Connected to database"),
        Err(e) => error!(?e, "Database connection error"),
    }

    Arc::new(store)
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            panic!("unable to load env vars: {e}");
        }
    }

    let config = RuntimeConfiguration::new().expect("unable to create config");
    let _log_guards =
        logging::init(config.server_config().log_dir()).expect("unable to set up logging");

    info!("`tracing` online");

    let store = open_store(&config).await;
    let state = AppState::new(store, config.clone());
    let app = routes::app(state.clone());

    let server_address = config.server_config().listen_address();
    let listener = TcpListener::bind(&server_address)
        .await
        .expect("unable to listen on server address");

    info!(
        ?server_address,
        environment = config.server_config().environment(),
        "Listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await
        .expect("unable to serve app");
}
