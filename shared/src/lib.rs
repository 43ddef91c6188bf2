use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{decode_packet, encode_frame, read_packet, write_packet, CodecError, MAX_FRAME_LEN};

pub const FIELD_WIDTH: f32 = 40.0;
pub const FIELD_HEIGHT: f32 = 20.0;
pub const BALL_RADIUS: f32 = 0.5;
pub const PADDLE_WIDTH: f32 = 1.0;
pub const PADDLE_HEIGHT: f32 = 6.0;
pub const PADDLE_X_OFFSET: f32 = 18.0;
/// Advisory paddle travel budget in units per second. Clients honour it, the
/// server only clamps positions.
pub const PADDLE_SPEED: f32 = 8.0;
pub const BASE_BALL_SPEED: f32 = 5.0;
/// Serve velocity on the y axis is drawn from `[-SERVE_VERTICAL_RANGE, SERVE_VERTICAL_RANGE)`.
pub const SERVE_VERTICAL_RANGE: f32 = 3.0;
pub const BALL_SPEED_INCREASE: f32 = 1.05;
pub const MAX_BALL_SPEED: f32 = 15.0;
pub const DEFLECTION_FACTOR: f32 = 0.2;
pub const MAX_SCORE: u32 = 11;
pub const TICK_RATE: u32 = 60;

/// One of the two player roles. Slot one defends the left wall.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn number(self) -> u8 {
        match self {
            PlayerSlot::One => 1,
            PlayerSlot::Two => 2,
        }
    }

    pub fn opponent(self) -> PlayerSlot {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

/// Tunables for a match. `Default` yields the standard field and rules.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameConfig {
    pub field_width: f32,
    pub field_height: f32,
    pub ball_radius: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub paddle_x_offset: f32,
    pub paddle_speed: f32,
    pub base_ball_speed: f32,
    pub serve_vertical_range: f32,
    pub speed_increase: f32,
    pub max_ball_speed: f32,
    pub deflection_factor: f32,
    pub max_score: u32,
    pub tick_rate: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            ball_radius: BALL_RADIUS,
            paddle_width: PADDLE_WIDTH,
            paddle_height: PADDLE_HEIGHT,
            paddle_x_offset: PADDLE_X_OFFSET,
            paddle_speed: PADDLE_SPEED,
            base_ball_speed: BASE_BALL_SPEED,
            serve_vertical_range: SERVE_VERTICAL_RANGE,
            speed_increase: BALL_SPEED_INCREASE,
            max_ball_speed: MAX_BALL_SPEED,
            deflection_factor: DEFLECTION_FACTOR,
            max_score: MAX_SCORE,
            tick_rate: TICK_RATE,
        }
    }
}

impl GameConfig {
    /// Logical time advanced by one tick.
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Largest distance a paddle centre may sit from the horizontal midline.
    pub fn paddle_y_limit(&self) -> f32 {
        self.field_height / 2.0 - self.paddle_height / 2.0
    }

    pub fn clamp_paddle_y(&self, y: f32) -> f32 {
        let limit = self.paddle_y_limit();
        y.clamp(-limit, limit)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
}

impl Ball {
    pub fn new(radius: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            vel_x: 0.0,
            vel_y: 0.0,
            radius,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub slot: PlayerSlot,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Paddle {
    /// Builds the paddle for `slot` at its wall offset, vertically centred.
    pub fn for_slot(slot: PlayerSlot, config: &GameConfig) -> Self {
        let x = match slot {
            PlayerSlot::One => -config.paddle_x_offset,
            PlayerSlot::Two => config.paddle_x_offset,
        };

        Self {
            slot,
            x,
            y: 0.0,
            width: config.paddle_width,
            height: config.paddle_height,
        }
    }

    pub fn top(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y - self.height / 2.0
    }

    pub fn left(&self) -> f32 {
        self.x - self.width / 2.0
    }

    pub fn right(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub player1: u32,
    pub player2: u32,
}

impl Score {
    pub fn get(&self, slot: PlayerSlot) -> u32 {
        match slot {
            PlayerSlot::One => self.player1,
            PlayerSlot::Two => self.player2,
        }
    }

    /// Awards a point to `slot` and returns its new total.
    pub fn increment(&mut self, slot: PlayerSlot) -> u32 {
        let points = match slot {
            PlayerSlot::One => &mut self.player1,
            PlayerSlot::Two => &mut self.player2,
        };
        *points = points.saturating_add(1);
        *points
    }
}

/// Consistent view of the whole match at the end of a tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameState {
    pub tick: u32,
    pub ball: Ball,
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub score: Score,
    pub field_width: f32,
    pub field_height: f32,
}

impl GameState {
    pub fn paddle(&self, slot: PlayerSlot) -> &Paddle {
        match slot {
            PlayerSlot::One => &self.paddle1,
            PlayerSlot::Two => &self.paddle2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    PaddleMove {
        y: f32,
    },
    RestartRequest,
    Disconnect,

    PlayerAssigned {
        slot: Option<PlayerSlot>,
        state: GameState,
    },
    PlayersConnected {
        slot1_filled: bool,
        slot2_filled: bool,
    },
    GameStarted,
    GameState(GameState),
    Score(Score),
    GameOver {
        winner: PlayerSlot,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// True for packets a client is allowed to send.
    pub fn is_client_command(&self) -> bool {
        matches!(
            self,
            Packet::PaddleMove { .. } | Packet::RestartRequest | Packet::Disconnect
        )
    }
}

/// Reflects the ball off the top or bottom wall. At most one reflection per call.
pub fn resolve_wall_collision(ball: &mut Ball, field_height: f32) -> bool {
    let half_height = field_height / 2.0;

    if ball.y + ball.radius >= half_height || ball.y - ball.radius <= -half_height {
        ball.vel_y = -ball.vel_y;
        ball.y = ball
            .y
            .clamp(-half_height + ball.radius, half_height - ball.radius);
        return true;
    }

    false
}

/// Returns true when the ball touches the paddle's facing edge while moving toward it.
pub fn check_paddle_collision(ball: &Ball, paddle: &Paddle) -> bool {
    let overlaps_vertically =
        ball.y + ball.radius >= paddle.bottom() && ball.y - ball.radius <= paddle.top();

    if !overlaps_vertically {
        return false;
    }

    match paddle.slot {
        PlayerSlot::One => ball.x - ball.radius <= paddle.right() && ball.vel_x < 0.0,
        PlayerSlot::Two => ball.x + ball.radius >= paddle.left() && ball.vel_x > 0.0,
    }
}

/// Bounces the ball off `paddle`, speeding it up and deflecting it by the hit offset.
pub fn resolve_paddle_collision(ball: &mut Ball, paddle: &Paddle, config: &GameConfig) -> bool {
    if !check_paddle_collision(ball, paddle) {
        return false;
    }

    ball.vel_x = -ball.vel_x * config.speed_increase;
    ball.vel_y += (ball.y - paddle.y) * config.deflection_factor;
    ball.x = match paddle.slot {
        PlayerSlot::One => paddle.right() + ball.radius,
        PlayerSlot::Two => paddle.left() - ball.radius,
    };
    ball.vel_x = ball
        .vel_x
        .clamp(-config.max_ball_speed, config.max_ball_speed);

    true
}
