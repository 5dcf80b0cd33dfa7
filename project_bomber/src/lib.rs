pub mod config;
pub mod shutdown;

use std::net::SocketAddr;
use std::sync::Arc;

use arena::{ArenaError, SystemClock};
use engine_core::{ArenaService, RoomRegistry};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::{ConfigError, ServerConfig};
use crate::shutdown::ShutdownRx;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("room setup failed: {0}")]
    Room(#[from] ArenaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A bound, not yet running arena server.
pub struct Server {
    listener: TcpListener,
    service: Arc<ArenaService>,
    registry: Arc<RoomRegistry>,
    max_input_length: usize,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Server {
    /// Build the registry, pre-create the default room and bind the listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let (stop_tx, stop_rx) = watch::channel(false);

        let registry = Arc::new(RoomRegistry::new(
            config.room_settings(),
            Arc::new(SystemClock),
            stop_rx.clone(),
        )?);
        if let Some(name) = config.default_room() {
            registry.get_or_create(name)?;
        }
        let service = Arc::new(ArenaService::new(registry.clone()));

        let listener = TcpListener::bind(config.listen_addr()).await?;
        tracing::info!("Bomberman server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            service,
            registry,
            max_input_length: config.net.max_input_length,
            stop_tx,
            stop_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &Arc<ArenaService> {
        &self.service
    }

    /// Serve until `shutdown` fires, then notify every session, stop the
    /// accept loop and room tickers, and wait for all of them.
    pub async fn run(self, mut shutdown: ShutdownRx) -> Result<(), ServerError> {
        let Server {
            listener,
            service,
            registry,
            max_input_length,
            stop_tx,
            stop_rx,
        } = self;

        let mut serve = tokio::spawn(net::serve(listener, service.clone(), max_input_length, stop_rx));

        let early = tokio::select! {
            _ = shutdown.wait() => None,
            result = &mut serve => Some(result),
        };

        if early.is_none() {
            service.shutdown_all();
        }
        let _ = stop_tx.send(true);

        let result = match early {
            Some(result) => result,
            None => serve.await,
        };
        registry.join_tickers().await;
        tracing::info!("Server stopped.");
        result??;
        Ok(())
    }
}
