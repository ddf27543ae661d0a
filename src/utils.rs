//utils shared across the server, the engine and the client:
//graceful shutdown and wire timestamp formatting
use chrono::Utc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Returns a token that is cancelled on ctrl-c or, on unix, SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for shutdown signals
    tokio::spawn(async move {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tc.cancel();
    });
    token
}

/// Current UTC time in the wire format used for order and trade timestamps,
/// e.g. `2025-06-14T10:00:00.000000Z`.
pub fn current_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
