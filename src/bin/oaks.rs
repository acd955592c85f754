//! Authorization server binary.
//!
//! Loads configuration from the environment, resolves the storage and session
//! backends, initializes the signing keys and serves HTTP with graceful shutdown.

use anyhow::Result;
use oaks::{
    config::Config,
    http::{AppState, build_router},
    oauth::KeyManager,
    storage::{
        cleanup_expired_credentials, create_session_backend, create_storage_backend,
        parse_session_backend, parse_storage_backend,
    },
};
use std::{env, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "oaks=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = oaks::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting oaks");

    let config = Config::new()?;

    let storage_backend =
        parse_storage_backend(&config.storage_backend, config.database_url.as_deref())?;
    let storage = create_storage_backend(storage_backend, &config.keys_path).await?;

    let session_backend =
        parse_session_backend(&config.session_backend, config.redis_url.as_deref())?;
    let sessions = create_session_backend(session_backend)?;

    let key_manager = Arc::new(KeyManager::new(storage.keys.clone()));
    key_manager.initialize().await?;
    let kid = key_manager.key_id()?;
    tracing::info!(kid, "Signing keys ready");

    let app_context = AppState::new(
        Arc::new(config.clone()),
        &storage,
        sessions,
        key_manager,
        bcrypt::DEFAULT_COST,
    );

    let app = build_router(app_context);

    // Setup graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    // Remove expired codes and tokens
    {
        let oauth_storage = storage.oauth.clone();
        let inner_token = token.clone();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(err) = cleanup_expired_credentials(oauth_storage.as_ref()).await {
                            tracing::error!(error = ?err, "Cleanup of expired credentials failed");
                        }
                    }
                }
            }
            tracing::info!("cleanup task stopped");
        });
    }

    // Start HTTP server
    {
        let http_port = *config.http_port.as_ref();
        let bind_address = format!("0.0.0.0:{http_port}");
        let listener = TcpListener::bind(&bind_address).await?;
        tracing::info!("Starting server on {bind_address}");

        let inner_token = token.clone();
        tracker.spawn(async move {
            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}
