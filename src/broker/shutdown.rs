//! Termination signals.
//!
//! Signals are only observed here; the Broker never sees them directly. The
//! binary waits on [`wait_for_shutdown_signal`] in its own task and cancels the
//! Broker's token, which the loop checks between iterations.
//!
//! On Unix: SIGINT, SIGQUIT, SIGABRT and SIGTERM. Elsewhere: Ctrl-C.

use std::io;

/// SIGABRT has no named constructor on `SignalKind`.
#[cfg(unix)]
const SIGABRT: i32 = 6;

/// Completes when the process receives a termination signal, returning its name.
///
/// # Errors
///
/// Returns an error if a signal handler can't be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sigabrt = signal(SignalKind::from_raw(SIGABRT))?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigquit.recv() => "SIGQUIT",
        _ = sigabrt.recv() => "SIGABRT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
