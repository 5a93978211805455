use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{
    SERVO_EXTENDED_ANGLE, SERVO_RETRACTED_ANGLE, STANDUP_EXTEND_MS, STANDUP_PUSH_MS,
    STANDUP_RETRACT_MS, STANDUP_SETTLE_MS,
};
use crate::hal::StandupActuator;

// ── Servo pulse ───────────────────────────────────────────────────────────────

pub const SERVO_MIN_PULSE_US: u32 = 500;
pub const SERVO_MAX_PULSE_US: u32 = 2500;
pub const SERVO_MAX_ANGLE: u8 = 180;
pub const SERVO_PERIOD_US: u32 = 20_000;

/// Pulse width for a hobby servo angle, clamped to 0..=180.
pub fn servo_pulse_us(angle: u8) -> u32 {
    let angle = angle.min(SERVO_MAX_ANGLE) as u32;
    SERVO_MIN_PULSE_US + (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) * angle / SERVO_MAX_ANGLE as u32
}

// ── Sequencer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StandupPhase {
    Idle,
    Extending,
    Pushing,
    Retracting,
    /// Finished, holding before the next request is accepted
    Complete,
}

/// Timed kick-stand sequence: extend the arm, hold while the robot is pushed
/// upright, retract, then settle.
#[derive(Debug, Clone)]
pub struct StandupSequencer {
    phase: StandupPhase,
    phase_start_ms: u64,
    pending: bool,
    extended_angle: u8,
    retracted_angle: u8,
    angle: u8,
}

impl StandupSequencer {
    pub const fn new() -> Self {
        Self {
            phase: StandupPhase::Idle,
            phase_start_ms: 0,
            pending: false,
            extended_angle: SERVO_EXTENDED_ANGLE,
            retracted_angle: SERVO_RETRACTED_ANGLE,
            angle: SERVO_RETRACTED_ANGLE,
        }
    }

    pub fn set_angles(&mut self, extended: u8, retracted: u8) {
        self.extended_angle = extended.min(SERVO_MAX_ANGLE);
        self.retracted_angle = retracted.min(SERVO_MAX_ANGLE);
        if !self.is_in_progress() {
            self.angle = self.retracted_angle;
        }
    }

    /// Ignored while a sequence is running. The sequence counts as in
    /// progress from here on, it starts moving on the next `update`.
    pub fn request(&mut self) -> bool {
        if self.is_in_progress() {
            return false;
        }
        self.pending = true;
        true
    }

    /// Advance the sequence; returns the servo angle to command.
    pub fn update(&mut self, now_ms: u64) -> u8 {
        if self.pending {
            self.pending = false;
            self.enter(StandupPhase::Extending, now_ms);
            self.angle = self.extended_angle;
            info!("standup: extending to {}", self.angle);
        }

        let elapsed = now_ms.saturating_sub(self.phase_start_ms);
        match self.phase {
            StandupPhase::Idle => {}
            StandupPhase::Extending => {
                if elapsed >= STANDUP_EXTEND_MS as u64 {
                    self.enter(StandupPhase::Pushing, now_ms);
                }
            }
            StandupPhase::Pushing => {
                if elapsed >= STANDUP_PUSH_MS as u64 {
                    self.enter(StandupPhase::Retracting, now_ms);
                    self.angle = self.retracted_angle;
                    info!("standup: retracting to {}", self.angle);
                }
            }
            StandupPhase::Retracting => {
                if elapsed >= STANDUP_RETRACT_MS as u64 {
                    self.enter(StandupPhase::Complete, now_ms);
                    info!("standup: complete");
                }
            }
            StandupPhase::Complete => {
                if elapsed >= STANDUP_SETTLE_MS as u64 {
                    self.enter(StandupPhase::Idle, now_ms);
                }
            }
        }

        self.angle
    }

    /// Abort and retract.
    pub fn reset(&mut self) {
        self.phase = StandupPhase::Idle;
        self.pending = false;
        self.angle = self.retracted_angle;
    }

    pub fn is_in_progress(&self) -> bool {
        self.pending || self.phase != StandupPhase::Idle
    }

    pub fn is_complete(&self) -> bool {
        self.phase == StandupPhase::Complete
    }

    pub fn phase(&self) -> StandupPhase {
        self.phase
    }

    pub fn angle(&self) -> u8 {
        self.angle
    }

    fn enter(&mut self, phase: StandupPhase, now_ms: u64) {
        self.phase = phase;
        self.phase_start_ms = now_ms;
    }
}

impl Default for StandupSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequencer shared between the control activity, which requests and
/// observes, and the servo task, which advances it.
pub struct StandupLink {
    inner: Mutex<CriticalSectionRawMutex, RefCell<StandupSequencer>>,
}

impl StandupLink {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(StandupSequencer::new())),
        }
    }

    pub fn update(&self, now_ms: u64) -> u8 {
        self.inner.lock(|s| s.borrow_mut().update(now_ms))
    }

    pub fn reset(&self) {
        self.inner.lock(|s| s.borrow_mut().reset())
    }

}

impl Default for StandupLink {
    fn default() -> Self {
        Self::new()
    }
}

impl StandupActuator for &StandupLink {
    fn set_standup_request(&mut self) {
        self.inner.lock(|s| {
            s.borrow_mut().request();
        })
    }

    fn is_standup_in_progress(&self) -> bool {
        self.inner.lock(|s| s.borrow().is_in_progress())
    }

    fn is_standup_complete(&self) -> bool {
        self.inner.lock(|s| s.borrow().is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_width_spans_the_servo_range() {
        assert_eq!(servo_pulse_us(0), 500);
        assert_eq!(servo_pulse_us(90), 1500);
        assert_eq!(servo_pulse_us(180), 2500);
        assert_eq!(servo_pulse_us(250), 2500);
    }

    #[test]
    fn runs_the_full_sequence() {
        let mut seq = StandupSequencer::new();
        assert!(!seq.is_in_progress());
        assert!(seq.request());
        assert!(seq.is_in_progress());

        assert_eq!(seq.update(0), SERVO_EXTENDED_ANGLE);
        assert_eq!(seq.phase(), StandupPhase::Extending);

        seq.update(999);
        assert_eq!(seq.phase(), StandupPhase::Extending);
        seq.update(1000);
        assert_eq!(seq.phase(), StandupPhase::Pushing);

        assert_eq!(seq.update(3000), SERVO_RETRACTED_ANGLE);
        assert_eq!(seq.phase(), StandupPhase::Retracting);

        seq.update(4000);
        assert!(seq.is_complete());
        assert!(seq.is_in_progress());

        seq.update(4500);
        assert_eq!(seq.phase(), StandupPhase::Idle);
        assert!(!seq.is_in_progress());
        assert!(!seq.is_complete());
    }

    #[test]
    fn request_ignored_while_running() {
        let mut seq = StandupSequencer::new();
        seq.request();
        seq.update(100);
        seq.update(1200);
        assert!(!seq.request());
        assert_eq!(seq.phase(), StandupPhase::Pushing);
    }

    #[test]
    fn reset_aborts_and_retracts() {
        let mut seq = StandupSequencer::new();
        seq.request();
        seq.update(0);
        seq.reset();
        assert!(!seq.is_in_progress());
        assert_eq!(seq.angle(), SERVO_RETRACTED_ANGLE);
        assert_eq!(seq.update(5000), SERVO_RETRACTED_ANGLE);
    }

    #[test]
    fn link_implements_actuator() {
        let link = StandupLink::new();
        let mut actuator = &link;
        actuator.set_standup_request();
        assert!(actuator.is_standup_in_progress());
        assert!(!actuator.is_standup_complete());

        link.update(0);
        link.update(1000);
        link.update(3000);
        link.update(4000);
        assert!(actuator.is_standup_complete());
        link.update(4500);
        assert!(!actuator.is_standup_in_progress());
    }

    #[test]
    fn link_reset_retracts_mid_sequence() {
        let link = StandupLink::new();
        let mut actuator = &link;
        actuator.set_standup_request();
        assert_eq!(link.update(0), SERVO_EXTENDED_ANGLE);

        link.reset();
        assert!(!actuator.is_standup_in_progress());
        assert_eq!(link.update(1500), SERVO_RETRACTED_ANGLE);
    }
}
