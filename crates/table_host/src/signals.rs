//! Signal handling for graceful table shutdown.
//!
//! The host races this future against its bots; whichever finishes first
//! triggers the close of the table listener.

use tokio::signal;
use tracing::info;

/// Waits for a termination signal.
///
/// Resolves once the process is asked to stop so the caller can close the
/// listener, letting queued connectors fail with `Closed` and seated clients
/// see end of stream before the process exits.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
///
/// # Returns
///
/// `Ok(())` when a signal arrives, or an error if a signal stream could not
/// be registered with the runtime.
///
/// # Example
///
/// ```ignore
/// tokio::select! {
///     _ = bots_finished => {}
///     result = wait_for_shutdown_signal() => result?,
/// }
/// listener.close();
/// ```
pub async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, closing table");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, closing table");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, closing table");
    }

    Ok(())
}
