use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use server::store::{MemoryStore, Storer};
use shared::GameData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, preloads the game if one is given, then
/// serves connections until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Seconds between heartbeat pings
        #[clap(long, default_value = "30")]
        heartbeat_secs: u64,
        /// JSON file with the game to open on startup
        #[clap(short, long)]
        game: Option<PathBuf>,
        /// Admin password for the preloaded game
        #[clap(short, long)]
        admin_password: Option<String>,
    }

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        heartbeat: Duration::from_secs(args.heartbeat_secs.max(1)),
        ..Default::default()
    };

    let store: Arc<dyn Storer> = Arc::new(MemoryStore::new());
    let server = Server::bind(config, store).await?;

    if let Some(path) = &args.game {
        let data: GameData = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let session = server
            .registry()
            .create_session(data, args.admin_password.clone())
            .await?;
        info!("Game {} loaded from {}", session.id(), path.display());
    }

    let shutdown = server.shutdown_token();
    let mut server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server failed: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    shutdown.cancel();
    server_handle.await??;

    Ok(())
}
