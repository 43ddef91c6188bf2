//! Paddle commands arriving from connections
//!
//! A paddle command is the only way anything outside the simulation moves a
//! paddle. The sender must hold a slot and may only move its own paddle.
//! Everything else is dropped without telling the sender.

use crate::client_manager::ClientId;
use crate::game::Simulation;
use crate::session::SlotTable;
use shared::PlayerSlot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaddleMoveOutcome {
    /// The sender's paddle now sits at `y`, after clamping
    Applied { slot: PlayerSlot, y: f32 },
    /// The sender holds no slot
    Unassigned,
    /// The target was NaN or infinite
    Malformed,
}

pub fn submit_paddle_move(
    slots: &SlotTable,
    simulation: &mut Simulation,
    client_id: ClientId,
    target_y: f32,
) -> PaddleMoveOutcome {
    let Some(slot) = slots.slot_of(client_id) else {
        return PaddleMoveOutcome::Unassigned;
    };

    if !target_y.is_finite() {
        return PaddleMoveOutcome::Malformed;
    }

    let y = simulation.set_paddle_y(slot, target_y);
    PaddleMoveOutcome::Applied { slot, y }
}
