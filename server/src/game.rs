use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    resolve_paddle_collision, resolve_wall_collision, Ball, GameConfig, GameState, Paddle,
    PlayerSlot, Score,
};

/// What a single simulation step produced besides the new positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// Updated score when a goal was scored this tick
    pub scored: Option<Score>,
    /// Set when the goal brought the scorer to the winning total
    pub winner: Option<PlayerSlot>,
}

/// Authoritative ball, paddle and score state for one match.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: GameConfig,
    tick: u32,
    ball: Ball,
    paddle1: Paddle,
    paddle2: Paddle,
    score: Score,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        let mut ball = Ball::new(config.ball_radius);
        ball.vel_x = config.base_ball_speed;
        ball.vel_y = config.serve_vertical_range;

        Self {
            paddle1: Paddle::for_slot(PlayerSlot::One, &config),
            paddle2: Paddle::for_slot(PlayerSlot::Two, &config),
            config,
            tick: 0,
            ball,
            score: Score::default(),
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn paddle(&self, slot: PlayerSlot) -> &Paddle {
        match slot {
            PlayerSlot::One => &self.paddle1,
            PlayerSlot::Two => &self.paddle2,
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn snapshot(&self) -> GameState {
        GameState {
            tick: self.tick,
            ball: self.ball,
            paddle1: self.paddle1,
            paddle2: self.paddle2,
            score: self.score,
            field_width: self.config.field_width,
            field_height: self.config.field_height,
        }
    }

    /// Prepares a fresh match: zero score, zero tick, ball served from the centre.
    pub fn reset_match(&mut self) {
        self.tick = 0;
        self.score = Score::default();
        self.reset_ball();
    }

    /// Serves the ball from the centre toward a random side.
    pub fn reset_ball(&mut self) {
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let range = self.config.serve_vertical_range;

        self.ball.x = 0.0;
        self.ball.y = 0.0;
        self.ball.vel_x = direction * self.config.base_ball_speed;
        self.ball.vel_y = if range > 0.0 {
            self.rng.gen_range(-range..range)
        } else {
            0.0
        };
    }

    /// Moves the paddle owned by `slot`, clamped into the field. Returns the applied y.
    pub fn set_paddle_y(&mut self, slot: PlayerSlot, y: f32) -> f32 {
        let clamped = self.config.clamp_paddle_y(y);
        match slot {
            PlayerSlot::One => self.paddle1.y = clamped,
            PlayerSlot::Two => self.paddle2.y = clamped,
        }
        clamped
    }

    /// Advances the match by one fixed tick.
    pub fn step(&mut self) -> StepOutcome {
        let dt = self.config.tick_delta();
        self.tick = self.tick.wrapping_add(1);

        self.ball.x += self.ball.vel_x * dt;
        self.ball.y += self.ball.vel_y * dt;

        resolve_wall_collision(&mut self.ball, self.config.field_height);

        // Left paddle first so simultaneous eligibility resolves the same way every time
        resolve_paddle_collision(&mut self.ball, &self.paddle1, &self.config);
        resolve_paddle_collision(&mut self.ball, &self.paddle2, &self.config);

        let half_width = self.config.field_width / 2.0;
        let scorer = if self.ball.x < -half_width {
            PlayerSlot::Two
        } else if self.ball.x > half_width {
            PlayerSlot::One
        } else {
            return StepOutcome::default();
        };

        let points = self.score.increment(scorer);
        self.reset_ball();

        debug!(
            "{} scored at tick {} ({} - {})",
            scorer, self.tick, self.score.player1, self.score.player2
        );

        StepOutcome {
            scored: Some(self.score),
            winner: (points >= self.config.max_score).then_some(scorer),
        }
    }

    #[cfg(test)]
    pub(crate) fn place_ball(&mut self, ball: Ball) {
        self.ball = ball;
    }

    #[cfg(test)]
    pub(crate) fn set_score(&mut self, score: Score) {
        self.score = score;
    }
}
