//! State shared between the periodic activities.
//!
//! Every domain is its own critical-section mutex around a `Copy` value:
//! accessors lock, copy in or out, and unlock. No lock is held across I/O
//! and no two domains are ever locked together.

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::Tuning;
use crate::drivers::encoder::WheelTicks;
use crate::drivers::remote::RemoteCommand;
use crate::hal::GpsFix;
use crate::supervisor::RobotMode;

// ── Fault bits ────────────────────────────────────────────────────────────────

pub const FAULT_IMU: u8 = 1 << 0;
pub const FAULT_MOTOR: u8 = 1 << 1;
pub const FAULT_LINK: u8 = 1 << 2;
pub const FAULT_GPS: u8 = 1 << 3;
/// A non-critical component failed to start
pub const FAULT_DEGRADED: u8 = 1 << 4;

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionState {
    /// deg
    pub filtered_angle: f32,
    /// deg/s, bias removed
    pub pitch_rate: f32,
    /// cm/s, mean of both wheels
    pub robot_velocity: f32,
    /// The cascade drove the motors in the last control cycle
    pub balancing_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct CommandState {
    command: RemoteCommand,
    standup_latched: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub frames_ok: u32,
    pub frames_dropped: u32,
    pub last_seq: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct TuningState {
    tuning: Tuning,
    revision: u32,
}

#[derive(Debug, Clone, Copy)]
struct AuxState {
    gps: Option<GpsFix>,
    battery_level: u8,
}

impl Default for AuxState {
    fn default() -> Self {
        Self {
            gps: None,
            battery_level: 100,
        }
    }
}

/// What the telemetry activity reports, gathered domain by domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub motion: MotionState,
    pub mode: RobotMode,
    pub gps: Option<GpsFix>,
    pub battery_level: u8,
    pub faults: u8,
}

// ── Coordinator ───────────────────────────────────────────────────────────────

pub struct ControlCoordinator {
    motion: Mutex<CriticalSectionRawMutex, Cell<MotionState>>,
    mode: Mutex<CriticalSectionRawMutex, Cell<RobotMode>>,
    command: Mutex<CriticalSectionRawMutex, Cell<CommandState>>,
    link: Mutex<CriticalSectionRawMutex, Cell<LinkStats>>,
    tuning: Mutex<CriticalSectionRawMutex, Cell<TuningState>>,
    aux: Mutex<CriticalSectionRawMutex, Cell<AuxState>>,
    fault_flags: AtomicU8,
    ticks: WheelTicks,
}

impl ControlCoordinator {
    pub fn new() -> Self {
        Self {
            motion: Mutex::new(Cell::new(MotionState::default())),
            mode: Mutex::new(Cell::new(RobotMode::Init)),
            command: Mutex::new(Cell::new(CommandState::default())),
            link: Mutex::new(Cell::new(LinkStats::default())),
            tuning: Mutex::new(Cell::new(TuningState::default())),
            aux: Mutex::new(Cell::new(AuxState::default())),
            fault_flags: AtomicU8::new(0),
            ticks: WheelTicks::new(),
        }
    }

    // ── Motion ──

    pub fn motion(&self) -> MotionState {
        self.motion.lock(|m| m.get())
    }

    /// Sensing side. Leaves `balancing_enabled` alone.
    pub fn publish_motion(&self, filtered_angle: f32, pitch_rate: f32, robot_velocity: f32) {
        self.motion.lock(|m| {
            let mut s = m.get();
            s.filtered_angle = filtered_angle;
            s.pitch_rate = pitch_rate;
            s.robot_velocity = robot_velocity;
            m.set(s);
        })
    }

    pub fn set_balancing_enabled(&self, enabled: bool) {
        self.motion.lock(|m| {
            let mut s = m.get();
            s.balancing_enabled = enabled;
            m.set(s);
        })
    }

    // ── Mode ──

    pub fn mode(&self) -> RobotMode {
        self.mode.lock(|m| m.get())
    }

    /// The only way to change the mode. Returns `(from, to)` when it changed.
    pub fn apply_transition(
        &self,
        f: impl FnOnce(RobotMode) -> RobotMode,
    ) -> Option<(RobotMode, RobotMode)> {
        let (from, to) = self.mode.lock(|m| {
            let from = m.get();
            let to = f(from);
            m.set(to);
            (from, to)
        });

        if from == to {
            return None;
        }
        info!("mode: {} -> {}", from.name(), to.name());
        Some((from, to))
    }

    // ── Remote command ──

    pub fn command(&self) -> RemoteCommand {
        self.command.lock(|c| c.get().command)
    }

    /// Replace the current command. A rising stand-up flag latches a
    /// request; an emergency stop drops any pending one.
    pub fn store_command(&self, command: RemoteCommand) {
        self.command.lock(|c| {
            let mut s = c.get();
            if command.standup_requested && !s.command.standup_requested {
                s.standup_latched = true;
            }
            if command.emergency_stop {
                s.standup_latched = false;
            }
            s.command = command;
            c.set(s);
        })
    }

    pub fn standup_pending(&self) -> bool {
        self.command.lock(|c| c.get().standup_latched)
    }

    pub fn clear_standup_request(&self) {
        self.command.lock(|c| {
            let mut s = c.get();
            s.standup_latched = false;
            c.set(s);
        })
    }

    // ── Link statistics ──

    pub fn record_frame(&self, seq: u8) {
        self.link.lock(|l| {
            let mut s = l.get();
            s.frames_ok = s.frames_ok.wrapping_add(1);
            s.last_seq = seq;
            l.set(s);
        })
    }

    pub fn record_dropped_frame(&self) {
        self.link.lock(|l| {
            let mut s = l.get();
            s.frames_dropped = s.frames_dropped.wrapping_add(1);
            l.set(s);
        })
    }

    pub fn link_stats(&self) -> LinkStats {
        self.link.lock(|l| l.get())
    }

    // ── Tuning ──

    /// Current tuning and its revision; the revision bumps on every change.
    pub fn tuning(&self) -> (Tuning, u32) {
        self.tuning.lock(|t| {
            let s = t.get();
            (s.tuning, s.revision)
        })
    }

    /// Edit the tuning in place. `f` returns whether it changed anything.
    pub fn update_tuning(&self, f: impl FnOnce(&mut Tuning) -> bool) -> bool {
        self.tuning.lock(|t| {
            let mut s = t.get();
            let changed = f(&mut s.tuning);
            if changed {
                s.revision = s.revision.wrapping_add(1);
                t.set(s);
            }
            changed
        })
    }

    // ── Auxiliary telemetry ──

    pub fn set_gps_fix(&self, fix: Option<GpsFix>) {
        self.aux.lock(|a| {
            let mut s = a.get();
            s.gps = fix;
            a.set(s);
        })
    }

    pub fn gps_fix(&self) -> Option<GpsFix> {
        self.aux.lock(|a| a.get().gps)
    }

    pub fn set_battery_level(&self, percent: u8) {
        self.aux.lock(|a| {
            let mut s = a.get();
            s.battery_level = percent.min(100);
            a.set(s);
        })
    }

    pub fn battery_level(&self) -> u8 {
        self.aux.lock(|a| a.get().battery_level)
    }

    // ── Lock-free parts ──

    pub fn raise_fault(&self, bits: u8) {
        self.fault_flags.fetch_or(bits, Ordering::Relaxed);
    }

    pub fn clear_fault(&self, bits: u8) {
        self.fault_flags.fetch_and(!bits, Ordering::Relaxed);
    }

    pub fn faults(&self) -> u8 {
        self.fault_flags.load(Ordering::Relaxed)
    }

    /// Encoder counters, written from interrupt context.
    pub fn wheel_ticks(&self) -> &WheelTicks {
        &self.ticks
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let motion = self.motion();
        let mode = self.mode();
        let (gps, battery_level) = self.aux.lock(|a| {
            let s = a.get();
            (s.gps, s.battery_level)
        });
        StatusSnapshot {
            motion,
            mode,
            gps,
            battery_level,
            faults: self.faults(),
        }
    }
}

impl Default for ControlCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigId;
    use crate::hal::Side;

    #[test]
    fn motion_publish_keeps_enable_flag() {
        let c = ControlCoordinator::new();
        c.set_balancing_enabled(true);
        c.publish_motion(3.5, -1.0, 12.0);
        let m = c.motion();
        assert_eq!(m.filtered_angle, 3.5);
        assert_eq!(m.pitch_rate, -1.0);
        assert_eq!(m.robot_velocity, 12.0);
        assert!(m.balancing_enabled);
    }

    #[test]
    fn mode_changes_only_through_transitions() {
        let c = ControlCoordinator::new();
        assert_eq!(c.mode(), RobotMode::Init);
        assert_eq!(
            c.apply_transition(|_| RobotMode::Idle),
            Some((RobotMode::Init, RobotMode::Idle))
        );
        assert_eq!(c.apply_transition(|m| m), None);
        assert_eq!(c.mode(), RobotMode::Idle);
    }

    #[test]
    fn standup_latches_on_rising_edge() {
        let c = ControlCoordinator::new();
        let up = RemoteCommand {
            standup_requested: true,
            ..RemoteCommand::default()
        };

        c.store_command(up);
        assert!(c.standup_pending());
        c.clear_standup_request();

        // flag still held: no new request
        c.store_command(up);
        assert!(!c.standup_pending());

        c.store_command(RemoteCommand::default());
        c.store_command(up);
        assert!(c.standup_pending());

        c.store_command(RemoteCommand {
            emergency_stop: true,
            ..RemoteCommand::default()
        });
        assert!(!c.standup_pending());
    }

    #[test]
    fn tuning_revision_bumps_on_change() {
        let c = ControlCoordinator::new();
        let (_, rev) = c.tuning();
        assert!(c.update_tuning(|t| t.set(ConfigId::PitchKp, 30.0)));
        assert!(!c.update_tuning(|t| t.set(ConfigId::PitchKp, f32::NAN)));
        let (t, rev2) = c.tuning();
        assert_eq!(rev2, rev + 1);
        assert_eq!(t.pitch.kp, 30.0);
    }

    #[test]
    fn faults_and_ticks_are_lock_free() {
        let c = ControlCoordinator::new();
        c.raise_fault(FAULT_IMU | FAULT_GPS);
        c.clear_fault(FAULT_IMU);
        assert_eq!(c.faults(), FAULT_GPS);

        c.wheel_ticks().add(Side::Left, 7);
        assert_eq!(c.wheel_ticks().snapshot(), (7, 0));
    }

    #[test]
    fn snapshot_collects_all_domains() {
        let c = ControlCoordinator::new();
        c.publish_motion(1.0, 0.0, 2.0);
        c.apply_transition(|_| RobotMode::Balancing);
        c.set_battery_level(150);
        let fix = GpsFix {
            latitude: 1.0,
            longitude: 2.0,
            altitude: 3.0,
            satellites: 4,
        };
        c.set_gps_fix(Some(fix));

        let s = c.snapshot();
        assert_eq!(s.mode, RobotMode::Balancing);
        assert_eq!(s.motion.robot_velocity, 2.0);
        assert_eq!(s.battery_level, 100);
        assert_eq!(s.gps, Some(fix));
    }

    #[test]
    fn concurrent_writers_never_tear_a_domain() {
        let c = ControlCoordinator::new();
        std::thread::scope(|scope| {
            for v in [1.0f32, 2.0] {
                let c = &c;
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        c.publish_motion(v, v, v);
                        c.wheel_ticks().add(Side::Left, 1);
                    }
                });
            }
            let c = &c;
            scope.spawn(move || {
                for _ in 0..2_000 {
                    let m = c.motion();
                    assert_eq!(m.filtered_angle, m.pitch_rate);
                    assert_eq!(m.pitch_rate, m.robot_velocity);
                }
            });
        });

        let m = c.motion();
        assert!(m.filtered_angle == 1.0 || m.filtered_angle == 2.0);
        assert_eq!(c.wheel_ticks().snapshot(), (4_000, 0));
    }
}
