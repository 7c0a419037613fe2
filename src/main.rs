use std::io;

use anyhow::Context;
use tokio::sync::broadcast;

use postbox::configuration::Settings;
use postbox::startup::Application;
use postbox::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
#[allow(clippy::redundant_pub_crate)]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = get_subscriber("postbox".into(), "info".into(), io::stdout);
    init_subscriber(subscriber);

    // Retrieve settings
    let config = Settings::get_config().context("Failed to load configuration")?;
    let shutdown_timeout = config.newsletter.shutdown_timeout();

    // Prepare the application and the dispatch trigger
    let application = Application::build(config.clone()).await?;
    let store = application.store();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let dispatch = application
        .start_dispatch(&config.newsletter, &shutdown_tx)
        .await?;

    // Serve until the server exits or a termination signal arrives
    let server = tokio::spawn(application.run_until_stopped());
    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => tracing::info!("API server exited"),
            Ok(Err(e)) => tracing::error!(error.message = %e, "API server failed"),
            Err(e) => tracing::error!(error.message = %e, "API server task panicked"),
        },
        () = shutdown_signal() => tracing::info!("Termination signal received"),
    }

    // Stop the dispatch trigger, bounded by the configured timeout
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(shutdown_timeout, dispatch.stop())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_millis = shutdown_timeout.as_millis(),
            "Dispatch loop did not stop in time, shutting down anyway"
        );
    }

    store
        .close()
        .await
        .context("Failed to close the subscriber store")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error.message = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error.message = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
