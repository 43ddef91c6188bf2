//! The single match session: who plays, whether the match runs, and what
//! everyone is told about it.
//!
//! Every entry point runs on the server loop and appends the packets it
//! produces to an outbox, which the loop hands to the connection roster once
//! the entry point returns. Nothing is sent while state is half-updated.

use crate::client_manager::ClientId;
use crate::config::ServerConfig;
use crate::game::Simulation;
use crate::input::{submit_paddle_move, PaddleMoveOutcome};
use crate::network::GameMessage;
use crate::scheduler::{SchedulerEvent, TickScheduler};
use log::{debug, info, warn};
use shared::{GameState, Packet, PlayerSlot};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Fewer than two players, or a halted match
    Waiting,
    /// Both slots filled and the ticker is running
    Running,
    /// A restart was accepted and the grace delay is running
    Restarting,
    /// Someone reached the winning score; waits for a restart
    Ended { winner: PlayerSlot },
}

/// Which connection holds which player slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotTable {
    player1: Option<ClientId>,
    player2: Option<ClientId>,
}

impl SlotTable {
    /// Gives the first free slot to `client_id`, or None when both are taken.
    pub fn assign(&mut self, client_id: ClientId) -> Option<PlayerSlot> {
        if let Some(slot) = self.slot_of(client_id) {
            return Some(slot);
        }

        if self.player1.is_none() {
            self.player1 = Some(client_id);
            Some(PlayerSlot::One)
        } else if self.player2.is_none() {
            self.player2 = Some(client_id);
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    /// Frees the slot held by `client_id`, if any.
    pub fn release(&mut self, client_id: ClientId) -> Option<PlayerSlot> {
        let slot = self.slot_of(client_id)?;
        match slot {
            PlayerSlot::One => self.player1 = None,
            PlayerSlot::Two => self.player2 = None,
        }
        Some(slot)
    }

    pub fn slot_of(&self, client_id: ClientId) -> Option<PlayerSlot> {
        if self.player1 == Some(client_id) {
            Some(PlayerSlot::One)
        } else if self.player2 == Some(client_id) {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.player1.is_some() && self.player2.is_some()
    }

    pub fn filled(&self) -> usize {
        usize::from(self.player1.is_some()) + usize::from(self.player2.is_some())
    }

    pub fn occupancy(&self) -> Packet {
        Packet::PlayersConnected {
            slot1_filled: self.player1.is_some(),
            slot2_filled: self.player2.is_some(),
        }
    }
}

pub struct Session {
    slots: SlotTable,
    phase: SessionPhase,
    simulation: Simulation,
    scheduler: TickScheduler,
    restart_delay: Duration,
    restart_requires_slot: bool,
    outbox: Vec<GameMessage>,
}

impl Session {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_simulation(Simulation::new(config.game.clone()), config)
    }

    pub fn with_simulation(simulation: Simulation, config: &ServerConfig) -> Self {
        Self {
            slots: SlotTable::default(),
            phase: SessionPhase::Waiting,
            simulation,
            scheduler: TickScheduler::new(config.tick_duration()),
            restart_delay: config.restart_delay,
            restart_requires_slot: config.restart_requires_slot,
            outbox: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn snapshot(&self) -> GameState {
        self.simulation.snapshot()
    }

    /// A new connection: assign a slot, tell the newcomer where it stands, then
    /// announce the new membership.
    pub fn on_connect(&mut self, client_id: ClientId) -> Option<PlayerSlot> {
        let slot = self.assign_slot(client_id);
        let state = self.simulation.snapshot();

        self.send_to(client_id, Packet::PlayerAssigned { slot, state });
        self.on_membership_changed();
        slot
    }

    pub fn assign_slot(&mut self, client_id: ClientId) -> Option<PlayerSlot> {
        let slot = self.slots.assign(client_id);
        match slot {
            Some(slot) => info!("Client {} plays as {}", client_id, slot),
            None => info!("Client {} joined as a spectator", client_id),
        }
        slot
    }

    /// Announces occupancy and starts a match once both slots are filled.
    ///
    /// A finished match counts as stopped, so a join after game over starts a
    /// fresh one. A running match or a pending restart is left alone.
    pub fn on_membership_changed(&mut self) {
        let occupancy = self.slots.occupancy();
        self.broadcast(occupancy);

        let active = matches!(
            self.phase,
            SessionPhase::Running | SessionPhase::Restarting
        );
        if self.slots.is_full() && !active {
            self.start_match();
        }
    }

    /// Any departure ends the current match. There is no pause or resume.
    pub fn on_disconnect(&mut self, client_id: ClientId) {
        if let Some(slot) = self.slots.release(client_id) {
            info!("{} (client {}) left, slot is free", slot, client_id);
        }

        if self.phase != SessionPhase::Waiting {
            info!("Match halted by departure of client {}", client_id);
        }

        self.scheduler.stop();
        self.phase = SessionPhase::Waiting;

        let occupancy = self.slots.occupancy();
        self.broadcast(occupancy);
    }

    /// Stops the match and schedules a fresh one after the grace delay.
    ///
    /// Ignored unless both slots are filled. Spectators may restart unless
    /// `restart_requires_slot` is configured.
    pub fn on_restart_request(&mut self, client_id: ClientId) -> bool {
        if !self.slots.is_full() {
            debug!(
                "Ignoring restart from client {}: {} of 2 slots filled",
                client_id,
                self.slots.filled()
            );
            return false;
        }

        if self.restart_requires_slot && self.slots.slot_of(client_id).is_none() {
            debug!("Ignoring restart from spectator {}", client_id);
            return false;
        }

        info!(
            "Client {} requested a restart, new match in {:?}",
            client_id, self.restart_delay
        );
        self.scheduler.schedule_restart(self.restart_delay);
        self.phase = SessionPhase::Restarting;
        true
    }

    pub fn on_restart_due(&mut self) {
        if self.phase != SessionPhase::Restarting || !self.slots.is_full() {
            return;
        }
        self.start_match();
    }

    /// One simulation step, followed by the events it caused and the new snapshot.
    pub fn on_tick(&mut self) {
        if self.phase != SessionPhase::Running {
            return;
        }

        let outcome = self.simulation.step();

        if let Some(score) = outcome.scored {
            self.broadcast(Packet::Score(score));
        }

        if let Some(winner) = outcome.winner {
            let score = self.simulation.score();
            info!(
                "{} wins {} - {} at tick {}",
                winner,
                score.player1,
                score.player2,
                self.simulation.tick()
            );

            self.scheduler.stop();
            self.phase = SessionPhase::Ended { winner };
            self.broadcast(Packet::GameOver { winner });
        }

        let snapshot = self.simulation.snapshot();
        self.broadcast(Packet::GameState(snapshot));
    }

    pub fn submit_paddle_move(&mut self, client_id: ClientId, y: f32) -> PaddleMoveOutcome {
        let outcome = submit_paddle_move(&self.slots, &mut self.simulation, client_id, y);
        if outcome == PaddleMoveOutcome::Malformed {
            debug!("Dropped malformed paddle move from client {}", client_id);
        }
        outcome
    }

    /// Routes a command received from `client_id`.
    pub fn handle_packet(&mut self, client_id: ClientId, packet: Packet) {
        match packet {
            Packet::PaddleMove { y } => {
                self.submit_paddle_move(client_id, y);
            }
            Packet::RestartRequest => {
                self.on_restart_request(client_id);
            }
            other => warn!(
                "Unexpected packet from client {}: {:?}",
                client_id, other
            ),
        }
    }

    /// Waits for the scheduler. Cancel safe.
    pub async fn next_event(&mut self) -> SchedulerEvent {
        self.scheduler.next_event().await
    }

    pub fn handle_scheduler_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Tick => self.on_tick(),
            SchedulerEvent::RestartDue => self.on_restart_due(),
        }
    }

    /// Takes every packet produced since the last drain, in production order.
    pub fn drain_outbox(&mut self) -> Vec<GameMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn start_match(&mut self) {
        self.simulation.reset_match();
        self.scheduler.start();
        self.phase = SessionPhase::Running;

        info!("Match started");
        self.broadcast(Packet::GameStarted);
    }

    fn broadcast(&mut self, packet: Packet) {
        self.outbox.push(GameMessage::BroadcastPacket { packet });
    }

    fn send_to(&mut self, client_id: ClientId, packet: Packet) {
        self.outbox
            .push(GameMessage::SendPacket { packet, client_id });
    }

    #[cfg(test)]
    pub(crate) fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }
}
