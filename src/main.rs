use std::process::ExitCode;

use inbox_relay::broker::{Broker, wait_for_shutdown_signal};
use inbox_relay::config::RelayConfig;
use inbox_relay::store::RedisStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    // The Broker never binds, but a bad backend name is still a broken deployment.
    if let Err(e) = config.backend() {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    let store = match RedisStore::open(&config.redis_url) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(url = %config.redis_url, error = %e, "Failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let broker = match Broker::new(config.broker(), &store) {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start broker");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "Shutdown requested"),
                Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
            }
            shutdown.cancel();
        });
    }

    match broker.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Broker terminated");
            ExitCode::FAILURE
        }
    }
}
