//! Process Runtime Helpers
//!
//! Startup and shutdown plumbing shared by the relay binaries.

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Install the process-wide rustls crypto provider.
///
/// Returns `false` if a provider was already installed.
pub fn install_crypto_provider() -> bool {
    rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
}

/// Load a `.env` file from the current directory or the nearest ancestor.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM, or for `shutdown_token` to be cancelled
/// elsewhere, then cancel it.
pub async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::info!("Pipeline stopped, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_when_token_is_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        await_shutdown(token.clone()).await;

        assert!(token.is_cancelled());
    }

    #[test]
    fn crypto_provider_installs_once() {
        let _ = install_crypto_provider();
        assert!(!install_crypto_provider());
    }
}
