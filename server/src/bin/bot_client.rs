//! Headless client that joins a match and tracks the ball with its paddle

use clap::Parser;
use log::{debug, info, warn};
use shared::{read_packet, write_packet, GameConfig, GameState, Packet, PlayerSlot};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    server: String,

    /// Paddle commands sent per second
    #[arg(short, long, default_value = "30")]
    rate: u32,

    /// Request a new match after each game over
    #[arg(long)]
    auto_restart: bool,

    /// Delay before requesting a new match
    #[arg(long, default_value = "2000")]
    restart_after_ms: u64,
}

/// Moves `current` toward `target` by at most `max_step`
fn step_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = (target - current).clamp(-max_step, max_step);
    current + delta
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", args.server);

    let (mut reader, mut writer) = stream.into_split();
    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if packet_tx.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read from server: {}", e);
                    break;
                }
            }
        }
    });

    let config = GameConfig::default();
    let rate = args.rate.max(1);
    let max_step = config.paddle_speed / rate as f32;

    let mut ticker = interval(Duration::from_secs_f64(1.0 / rate as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut slot: Option<PlayerSlot> = None;
    let mut latest: Option<GameState> = None;
    let mut paddle_y = 0.0;
    let mut restart_at: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            packet = packet_rx.recv() => {
                let Some(packet) = packet else {
                    break;
                };

                match packet {
                    Packet::PlayerAssigned { slot: assigned, state } => {
                        match assigned {
                            Some(s) => info!("Playing as {}", s),
                            None => info!("Both slots taken, watching"),
                        }
                        slot = assigned;
                        if let Some(s) = slot {
                            paddle_y = state.paddle(s).y;
                        }
                        latest = Some(state);
                    }
                    Packet::PlayersConnected { slot1_filled, slot2_filled } => {
                        debug!("Slots filled: {} / {}", slot1_filled, slot2_filled);
                    }
                    Packet::GameStarted => {
                        info!("Match started");
                        restart_at = None;
                    }
                    Packet::GameState(state) => latest = Some(state),
                    Packet::Score(score) => {
                        info!("Score {} - {}", score.player1, score.player2);
                    }
                    Packet::GameOver { winner } => {
                        info!("{} wins", winner);
                        if args.auto_restart {
                            restart_at = Some(
                                tokio::time::Instant::now()
                                    + Duration::from_millis(args.restart_after_ms),
                            );
                        }
                    }
                    Packet::Disconnected { reason } => {
                        info!("Disconnected by server: {}", reason);
                        break;
                    }
                    other => debug!("Ignoring {:?}", other),
                }
            },

            _ = ticker.tick() => {
                if restart_at.map_or(false, |at| tokio::time::Instant::now() >= at) {
                    restart_at = None;
                    info!("Requesting a new match");
                    write_packet(&mut writer, &Packet::RestartRequest).await?;
                }

                let (Some(s), Some(state)) = (slot, latest.as_ref()) else {
                    continue;
                };

                let target = config.clamp_paddle_y(state.ball.y);
                let next = step_toward(paddle_y, target, max_step);
                if next != paddle_y {
                    paddle_y = next;
                    debug!("{} paddle to {:.2}", s, paddle_y);
                    write_packet(&mut writer, &Packet::PaddleMove { y: paddle_y }).await?;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Leaving match");
                write_packet(&mut writer, &Packet::Disconnect).await?;
                break;
            }
        }
    }

    // Give the writer a moment before the socket drops
    sleep(Duration::from_millis(50)).await;
    Ok(())
}
