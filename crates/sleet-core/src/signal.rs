//! Process signals that stop the trigger loop.

use tracing::{error, info};

/// Resolves once the process is asked to stop.
///
/// On Unix this listens for SIGINT, SIGTERM and SIGQUIT. When the listeners
/// cannot be registered the failure is logged and the future stays pending,
/// so the loader keeps draining until it is killed.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    let mut listeners: Vec<(&'static str, Signal)> = Vec::with_capacity(3);
    for (name, kind) in [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGQUIT", SignalKind::quit()),
    ] {
        match signal(kind) {
            Ok(listener) => listeners.push((name, listener)),
            Err(e) => {
                error!(error = %e, signal = name, "Could not register signal listener");
                return std::future::pending().await;
            }
        }
    }

    let [(int_name, sigint), (term_name, sigterm), (quit_name, sigquit)] = &mut listeners[..]
    else {
        return std::future::pending().await;
    };

    let received = tokio::select! {
        _ = sigint.recv() => *int_name,
        _ = sigterm.recv() => *term_name,
        _ = sigquit.recv() => *quit_name,
    };
    info!(signal = received, "Stop requested");
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for ctrl-c");
        return std::future::pending().await;
    }
    info!(signal = "ctrl-c", "Stop requested");
}
