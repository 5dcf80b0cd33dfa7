use project_bomber::config::{parse_cli_args, ServerConfig};
use project_bomber::shutdown::{self, shutdown_channel};
use project_bomber::Server;

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = match parse_cli_args(std::env::args().skip(1))
        .and_then(|path| ServerConfig::resolve(path.as_deref()))
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Bomberman server starting...");

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::select! {
        signal = shutdown::wait_for_signal() => {
            if let Err(e) = signal {
                tracing::error!("Failed to listen for shutdown signals: {}", e);
            }
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger();
        }
        result = &mut server_task => {
            tracing::error!(?result, "Server exited unexpectedly");
            std::process::exit(1);
        }
    }

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Server task panicked: {}", e);
            std::process::exit(1);
        }
    }
}
