//! Graceful shutdown signal handling

use std::{future, io};

use thiserror::Error;
use tokio::{signal, sync::watch};
use tracing::info;

#[derive(Debug, Error)]
pub(crate) enum ShutdownSignalError {
    #[error("failed to install Ctrl+C handler: {0}")]
    CtrlC(#[source] io::Error),

    #[cfg(unix)]
    #[error("failed to install SIGTERM handler: {0}")]
    SigTerm(#[source] io::Error),

    #[cfg(windows)]
    #[error("failed to install Windows terminate handler: {0}")]
    Terminate(#[source] io::Error),
}

/// Wait for SIGINT or SIGTERM, then flip `trigger` to `true`.
pub(crate) async fn listen(trigger: watch::Sender<bool>) -> Result<(), ShutdownSignalError> {
    // Wait Shutdown Signal
    let ctrl_c = async {
        // Handle Ctrl+C signal
        signal::ctrl_c().await.map_err(ShutdownSignalError::CtrlC)
    };

    #[cfg(unix)]
    let terminate = async {
        // Handle SIGTERM on Unix systems
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(ShutdownSignalError::SigTerm)?
            .recv()
            .await;
        Ok::<(), ShutdownSignalError>(())
    };

    #[cfg(windows)]
    let terminate = async {
        // Handle Ctrl+C on Windows (alternative implementation)
        signal::windows::ctrl_c()
            .map_err(ShutdownSignalError::Terminate)?
            .recv()
            .await;
        Ok::<(), ShutdownSignalError>(())
    };

    // Wait for either signal to be received
    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("ctrl_c signal received");
        }
        result = terminate => {
            result?;
            info!("terminate signal received");
        }
    };

    trigger.send_replace(true);

    Ok(())
}

/// Resolves once shutdown has been requested. Never resolves if the trigger
/// is dropped without firing.
pub(crate) async fn requested(receiver: &mut watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }

        if receiver.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn requested_waits_for_the_trigger() {
        let (trigger, mut receiver) = watch::channel(false);

        let pending = time::timeout(Duration::from_secs(1), requested(&mut receiver)).await;
        assert!(pending.is_err(), "no shutdown requested yet");

        trigger.send_replace(true);

        let fired = time::timeout(Duration::from_secs(1), requested(&mut receiver)).await;
        assert!(fired.is_ok(), "shutdown requested");
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trigger_is_not_a_shutdown() {
        let (trigger, mut receiver) = watch::channel(false);
        drop(trigger);

        let result = time::timeout(Duration::from_secs(1), requested(&mut receiver)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn already_requested_resolves_immediately() {
        let (_trigger, mut receiver) = watch::channel(true);

        requested(&mut receiver).await;
    }
}
