use crate::drivers::protocol::{
    MovePayload, CMD_FLAG_BALANCE, CMD_FLAG_EMERGENCY, CMD_FLAG_STANDUP,
};

pub const TURN_LIMIT: i8 = 100;
pub const SPEED_LIMIT: u8 = 100;

/// Latest command from the remote controller, range-checked.
///
/// Built only from a decoded move payload (or [`RemoteCommand::default`]) and
/// always replaced as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteCommand {
    /// -1, 0 or 1
    pub direction: i8,
    /// -100..=100
    pub turn: i8,
    /// 0..=100
    pub speed: u8,
    pub balance_enabled: bool,
    pub standup_requested: bool,
    pub emergency_stop: bool,
}

impl RemoteCommand {
    /// The wire format allows any byte in every field, so each one is clamped here.
    pub fn from_move_payload(payload: &MovePayload) -> Self {
        // speed is signed on the sender side; 0x80..=0xFF are negative values
        let speed = payload.speed as i8;

        Self {
            direction: payload.direction.signum(),
            turn: payload.turn.clamp(-TURN_LIMIT, TURN_LIMIT),
            speed: speed.clamp(0, SPEED_LIMIT as i8) as u8,
            balance_enabled: payload.flags & CMD_FLAG_BALANCE != 0,
            standup_requested: payload.flags & CMD_FLAG_STANDUP != 0,
            emergency_stop: payload.flags & CMD_FLAG_EMERGENCY != 0,
        }
    }

    /// Wheel velocity setpoint (cm/s) for the outer balance loop.
    pub fn target_velocity(&self, scale: f32) -> f32 {
        self.direction as f32 * self.speed as f32 * scale
    }
}

impl Default for RemoteCommand {
    /// Stationary with balancing requested.
    fn default() -> Self {
        Self {
            direction: 0,
            turn: 0,
            speed: 0,
            balance_enabled: true,
            standup_requested: false,
            emergency_stop: false,
        }
    }
}
