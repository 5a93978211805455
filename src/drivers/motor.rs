//! H-bridge command for one DC motor: direction inputs plus PWM on the
//! enable line.

use crate::config::MOTOR_DUTY_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeState {
    /// IN1 high, IN2 low
    Forward,
    /// IN1 low, IN2 high
    Reverse,
    /// Both inputs low
    Coast,
}

impl BridgeState {
    /// Levels for the two direction inputs.
    pub fn inputs(self) -> (bool, bool) {
        match self {
            BridgeState::Forward => (true, false),
            BridgeState::Reverse => (false, true),
            BridgeState::Coast => (false, false),
        }
    }
}

/// Map a signed duty in `[-MOTOR_DUTY_MAX, MOTOR_DUTY_MAX]` to bridge
/// direction and a timer compare value in `[0, max_compare]`.
/// Out-of-range duties saturate.
pub fn bridge_command(duty: i16, max_compare: u16) -> (BridgeState, u16) {
    let limit = MOTOR_DUTY_MAX as i32;
    let duty = (duty as i32).clamp(-limit, limit);
    let state = match duty {
        0 => BridgeState::Coast,
        d if d > 0 => BridgeState::Forward,
        _ => BridgeState::Reverse,
    };
    let compare = duty.unsigned_abs() * max_compare as u32 / limit as u32;
    (state, compare as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coasts() {
        assert_eq!(bridge_command(0, 1000), (BridgeState::Coast, 0));
        assert_eq!(BridgeState::Coast.inputs(), (false, false));
    }

    #[test]
    fn sign_selects_direction() {
        let (fwd, c1) = bridge_command(100, 2550);
        let (rev, c2) = bridge_command(-100, 2550);
        assert_eq!(fwd, BridgeState::Forward);
        assert_eq!(rev, BridgeState::Reverse);
        assert_eq!(c1, 1000);
        assert_eq!(c1, c2);
        assert_eq!(fwd.inputs(), (true, false));
        assert_eq!(rev.inputs(), (false, true));
    }

    #[test]
    fn full_scale_and_saturation() {
        assert_eq!(bridge_command(MOTOR_DUTY_MAX, 4199).1, 4199);
        assert_eq!(bridge_command(i16::MAX, 4199), (BridgeState::Forward, 4199));
        assert_eq!(bridge_command(i16::MIN, 4199), (BridgeState::Reverse, 4199));
    }
}
