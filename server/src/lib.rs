//! # Match Server Library
//!
//! This library provides the authoritative server for a two-player paddle and
//! ball match. It owns the only copy of the physics and the score; clients
//! draw whatever state the server sends them.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The ball, both paddles and the score live in the server. Every tick the
//! ball is integrated, bounced off walls and paddles, and checked for goals.
//! Clients never compute physics.
//!
//! ### Session Lifecycle
//! The first two connections take the player slots, later ones watch. A match
//! starts when both slots are filled, ends when a player reaches the winning
//! score, and halts immediately when anyone disconnects. A restart request
//! stops the match, waits a grace delay and starts a fresh one.
//!
//! ### State Broadcasting
//! Lifecycle events and a full snapshot per tick are pushed to every
//! connection. A newcomer receives its slot and a snapshot right away.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One loop owns the session. Connection tasks only decode and encode
//! packets; they forward what they read over a channel and write whatever is
//! queued for them. Input, membership changes and ticks are therefore applied
//! one at a time, and each tick's broadcasts are queued only after the tick
//! has finished mutating state.
//!
//! ### TCP Transport
//! Each connection is a TCP stream carrying length-prefixed bincode frames
//! (see `shared::codec`). Stream closure is the disconnect signal; there are
//! no idle timeouts.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection roster, capacity and packet delivery
//! - `config`: server configuration and validation
//! - `game`: the simulation engine
//! - `input`: paddle commands from connections
//! - `network`: TCP tasks and the main server loop
//! - `scheduler`: cancellable tick timer with delayed restart
//! - `session`: player slots, match phases and event production
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:3001".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     config.validate()?;
//!
//!     let mut server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod scheduler;
pub mod session;
