//! Operating mode state machine.
//!
//! ```text
//!  Init ──ok──> Idle <──────────────┐
//!   │           │  ^                │ complete / cancelled
//!   │ halt      │  │ !balance       │
//!   v           v  │                │
//!  Error     Balancing ──> Fallen ──> StandingUp
//!                 |angle| > limit    standup request
//! ```
//!
//! Idle and Balancing also fall over into Fallen; Idle, Balancing and Fallen
//! accept a stand-up request. Error is terminal.

use micromath::F32Ext;

use crate::drivers::remote::RemoteCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RobotMode {
    Init = 0,
    Idle = 1,
    Balancing = 2,
    StandingUp = 3,
    Fallen = 4,
    Error = 5,
}

impl RobotMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Only Balancing runs the cascade; every other mode holds the motors at zero.
    pub fn drives_cascade(self) -> bool {
        self == RobotMode::Balancing
    }

    pub fn name(self) -> &'static str {
        match self {
            RobotMode::Init => "INIT",
            RobotMode::Idle => "IDLE",
            RobotMode::Balancing => "BALANCING",
            RobotMode::StandingUp => "STANDING_UP",
            RobotMode::Fallen => "FALLEN",
            RobotMode::Error => "ERROR",
        }
    }
}

/// Unknown raw values decode to [`RobotMode::Error`].
impl From<u8> for RobotMode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => RobotMode::Init,
            1 => RobotMode::Idle,
            2 => RobotMode::Balancing,
            3 => RobotMode::StandingUp,
            4 => RobotMode::Fallen,
            _ => RobotMode::Error,
        }
    }
}

impl Default for RobotMode {
    fn default() -> Self {
        RobotMode::Init
    }
}

/// Everything one transition step looks at.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorInput {
    /// Filtered pitch (deg)
    pub angle: f32,
    pub command: RemoteCommand,
    /// Latched stand-up request, pending until a transition takes it
    pub standup_requested: bool,
    pub standup_in_progress: bool,
    pub standup_complete: bool,
    pub fallen_threshold: f32,
}

/// Leave Init once the component bring-up has finished.
pub fn on_startup(mode: RobotMode, critical_failure: bool) -> RobotMode {
    match mode {
        RobotMode::Init if critical_failure => RobotMode::Error,
        RobotMode::Init => RobotMode::Idle,
        other => other,
    }
}

/// One transition step, evaluated at the start of every control cycle.
pub fn next_mode(mode: RobotMode, input: &SupervisorInput) -> RobotMode {
    // NaN counts as fallen
    let fallen = !(input.angle.abs() <= input.fallen_threshold);
    let cmd = &input.command;

    match mode {
        RobotMode::Init | RobotMode::Error => mode,

        RobotMode::Idle | RobotMode::Balancing => {
            if fallen {
                RobotMode::Fallen
            } else if cmd.emergency_stop {
                RobotMode::Idle
            } else if input.standup_requested && !input.standup_in_progress {
                // a request that arrives while the arm is still settling
                // stays latched until the sequencer is idle again
                RobotMode::StandingUp
            } else if cmd.balance_enabled && !input.standup_in_progress {
                RobotMode::Balancing
            } else {
                RobotMode::Idle
            }
        }

        // a held stand-up flag counts here as well as a fresh request
        RobotMode::Fallen => {
            let wanted = input.standup_requested || cmd.standup_requested;
            if wanted && !cmd.emergency_stop && !input.standup_in_progress {
                RobotMode::StandingUp
            } else {
                RobotMode::Fallen
            }
        }

        RobotMode::StandingUp => {
            if cmd.emergency_stop || input.standup_complete || !input.standup_in_progress {
                RobotMode::Idle
            } else {
                RobotMode::StandingUp
            }
        }
    }
}
