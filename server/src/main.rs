use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use shared::GameConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Points needed to win a match
    #[arg(short = 's', long, default_value = "11")]
    max_score: u32,

    /// Maximum simultaneous connections, spectators included
    #[arg(short = 'c', long, default_value = "32")]
    max_clients: usize,

    /// Delay between an accepted restart request and the new match
    #[arg(long, default_value = "1000")]
    restart_delay_ms: u64,

    /// Only players holding a slot may restart the match
    #[arg(long)]
    participants_only_restart: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        game: GameConfig {
            tick_rate: args.tick_rate,
            max_score: args.max_score,
            ..GameConfig::default()
        },
        restart_delay: Duration::from_millis(args.restart_delay_ms),
        restart_requires_slot: args.participants_only_restart,
    };
    config.validate()?;

    info!("Starting server...");
    info!(
        "Tick rate: {}Hz, first to {} points, up to {} clients",
        config.game.tick_rate, config.game.max_score, config.max_clients
    );

    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
