use tokio::sync::watch;

/// Held by main; flips every receiver to shut down.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Cloned to every subsystem that has to stop.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    /// Resolves once shutdown is triggered or the sender is dropped.
    pub async fn wait(&mut self) {
        net::wait_for_shutdown(&mut self.0).await
    }
}

/// Wait for SIGINT or SIGTERM on Unix, Ctrl+C elsewhere.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C");
    }
    Ok(())
}
