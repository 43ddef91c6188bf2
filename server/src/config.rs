//! Server configuration and validation

use shared::GameConfig;
use std::time::Duration;

/// Everything the server needs to bind, accept players and run matches.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to, `host:port`
    pub bind_addr: String,
    /// Maximum concurrent connections, spectators included
    pub max_clients: usize,
    /// Field geometry and match rules
    pub game: GameConfig,
    /// Pause between an accepted restart request and the new match
    pub restart_delay: Duration,
    /// Only slot holders may request a restart when set
    pub restart_requires_slot: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            max_clients: 32,
            game: GameConfig::default(),
            restart_delay: Duration::from_secs(1),
            restart_requires_slot: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Tick rate must be greater than zero")]
    ZeroTickRate,

    #[error("Winning score must be greater than zero")]
    ZeroWinThreshold,

    #[error("Paddle height {paddle} does not fit a field of height {field}")]
    PaddleTallerThanField { paddle: f32, field: f32 },

    #[error("Base ball speed {base} exceeds the maximum ball speed {max}")]
    BaseSpeedAboveMax { base: f32, max: f32 },

    #[error("Server must accept at least one client")]
    NoClientCapacity,
}

impl ServerConfig {
    /// Wall-clock period between two simulation ticks.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.game.tick_rate.max(1)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let game = &self.game;

        if game.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if game.max_score == 0 {
            return Err(ConfigError::ZeroWinThreshold);
        }
        if game.paddle_height > game.field_height {
            return Err(ConfigError::PaddleTallerThanField {
                paddle: game.paddle_height,
                field: game.field_height,
            });
        }
        if game.base_ball_speed > game.max_ball_speed {
            return Err(ConfigError::BaseSpeedAboveMax {
                base: game.base_ball_speed,
                max: game.max_ball_speed,
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::NoClientCapacity);
        }

        Ok(())
    }
}
