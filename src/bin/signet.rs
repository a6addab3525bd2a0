//! signet OpenID Provider server binary.
//!
//! Reads configuration from the environment, builds the Provider and its
//! stores, and serves the endpoint until interrupted.

use anyhow::Result;
use signet::{
    config::Config,
    http::{AppEngine, AppState, build_router},
    openid::{
        association_store_for,
        provider::{OpenIdProvider, ProviderSecuritySettings, RejectingDecider},
    },
    storage::{create_storage_backend, parse_storage_backend},
    templates::build_env,
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "signet=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = signet::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting signet");

    let config = Config::new()?;
    let endpoint = config.openid_endpoint()?;

    let template_env = AppEngine::from(build_env(version.clone())?);

    let storage_backend = parse_storage_backend(&config.storage_backend)?;
    let stores = create_storage_backend(storage_backend);

    let settings = ProviderSecuritySettings::from(&config);
    let encode_in_handles = *config.encode_associations_in_handles.as_ref();
    tracing::info!(
        %endpoint,
        encode_in_handles,
        minimum_hash_bit_length = settings.minimum_hash_bit_length,
        maximum_hash_bit_length = settings.maximum_hash_bit_length,
        require_ssl = settings.require_ssl,
        "provider settings"
    );
    let associations = association_store_for(
        encode_in_handles,
        stores.secrets.clone(),
        stores.keys.clone(),
        settings.shared_association_lifetime,
    );
    let provider = OpenIdProvider::new(endpoint, settings, associations, stores.nonces.clone())
        .with_form_post_threshold(*config.form_post_threshold.as_ref());

    let app_context = AppState {
        config: Arc::new(config.clone()),
        template_env,
        provider: Arc::new(provider),
        decider: Arc::new(RejectingDecider),
    };

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
                Ok(mut stream) => {
                    stream.recv().await;
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

    // Forget nonces and expired secrets that can no longer matter
    {
        let inner_token = token.clone();
        let nonces = signet::nonce::NonceTracker::new(stores.nonces.clone(), *config.max_nonce_age.as_ref());
        let secrets = stores.secrets.clone();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    _ = interval.tick() => {
                        match nonces.purge().await {
                            Ok(purged) if purged > 0 => tracing::debug!(purged, "expired nonces purged"),
                            Ok(_) => {}
                            Err(err) => tracing::warn!("nonce purge failed: {}", err),
                        }
                        if let Err(err) = secrets.cleanup_expired_secrets().await {
                            tracing::warn!("association secret cleanup failed: {}", err);
                        }
                    }
                }
            }
        });
    }

    // Start HTTP server
    {
        let http_port = *config.http_port.as_ref();
        let inner_token = token.clone();
        let bind_address = format!("0.0.0.0:{http_port}");
        tracing::info!("Starting server on {bind_address}");
        let listener = TcpListener::bind(&bind_address).await?;

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
