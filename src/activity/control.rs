use crate::config::Tuning;
use crate::drivers::balance::{mix_wheels, BalanceCascade};
use crate::hal::{MotorDriver, Side, StandupActuator};
use crate::state::{ControlCoordinator, FAULT_MOTOR};
use crate::supervisor::{next_mode, RobotMode, SupervisorInput};

use super::clamp_dt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    pub mode: RobotMode,
    /// `(from, to)` when this cycle changed the mode
    pub transition: Option<(RobotMode, RobotMode)>,
    pub cascade_output: f32,
    pub left: i16,
    pub right: i16,
}

/// Supervisor step, then mode-dependent actuation, once per control period.
pub struct ControlActivity {
    cascade: BalanceCascade,
    tuning: Tuning,
    tuning_revision: Option<u32>,
    motor_failed: bool,
}

impl ControlActivity {
    pub fn new() -> Self {
        Self {
            cascade: BalanceCascade::new(),
            tuning: Tuning::default(),
            tuning_revision: None,
            motor_failed: false,
        }
    }

    pub fn cascade(&self) -> &BalanceCascade {
        &self.cascade
    }

    pub fn step<M, A>(
        &mut self,
        motors: &mut M,
        standup: &mut A,
        coordinator: &ControlCoordinator,
        dt: f32,
    ) -> ControlOutput
    where
        M: MotorDriver,
        A: StandupActuator,
    {
        self.sync_tuning(coordinator);

        let motion = coordinator.motion();
        let command = coordinator.command();
        let input = SupervisorInput {
            angle: motion.filtered_angle,
            command,
            standup_requested: coordinator.standup_pending(),
            standup_in_progress: standup.is_standup_in_progress(),
            standup_complete: standup.is_standup_complete(),
            fallen_threshold: self.tuning.max_tilt_angle,
        };

        let mut mode = RobotMode::Init;
        let transition = coordinator.apply_transition(|current| {
            mode = next_mode(current, &input);
            mode
        });

        if let Some((_, RobotMode::StandingUp)) = transition {
            coordinator.clear_standup_request();
            standup.set_standup_request();
        }

        let (cascade_output, left, right) = if mode.drives_cascade() {
            self.cascade
                .set_target_velocity(command.target_velocity(self.tuning.drive_velocity_scale));
            let out = self.cascade.compute(
                motion.filtered_angle,
                motion.pitch_rate,
                motion.robot_velocity,
                clamp_dt(dt),
            );
            let (left, right) = mix_wheels(out, command.turn, self.tuning.turn_scale);
            (out, left, right)
        } else {
            self.cascade.reset();
            self.cascade.set_target_velocity(0.0);
            (0.0, 0, 0)
        };

        coordinator.set_balancing_enabled(mode.drives_cascade());
        self.drive(motors, coordinator, left, right);

        ControlOutput {
            mode,
            transition,
            cascade_output,
            left,
            right,
        }
    }

    fn sync_tuning(&mut self, coordinator: &ControlCoordinator) {
        let (tuning, revision) = coordinator.tuning();
        if self.tuning_revision == Some(revision) {
            return;
        }
        self.cascade.apply_tuning(&tuning);
        self.tuning = tuning;
        self.tuning_revision = Some(revision);
        debug!("tuning revision {} applied", revision);
    }

    fn drive<M: MotorDriver>(
        &mut self,
        motors: &mut M,
        coordinator: &ControlCoordinator,
        left: i16,
        right: i16,
    ) {
        let result = motors
            .set_motor_duty(Side::Left, left)
            .and_then(|_| motors.set_motor_duty(Side::Right, right));

        match result {
            Ok(()) if self.motor_failed => {
                self.motor_failed = false;
                coordinator.clear_fault(FAULT_MOTOR);
            }
            Ok(()) => {}
            Err(_) => {
                if !self.motor_failed {
                    warn!("motor write failed");
                }
                self.motor_failed = true;
                coordinator.raise_fault(FAULT_MOTOR);
            }
        }
    }
}

impl Default for ControlActivity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::mocks::{MockMotors, MockStandup};
    use crate::config::ConfigId;
    use crate::drivers::remote::RemoteCommand;

    fn running() -> ControlCoordinator {
        let c = ControlCoordinator::new();
        c.apply_transition(|_| RobotMode::Idle);
        c
    }

    fn balance_cmd() -> RemoteCommand {
        RemoteCommand {
            balance_enabled: true,
            ..RemoteCommand::default()
        }
    }

    #[test]
    fn init_holds_motors_at_zero() {
        let c = ControlCoordinator::new();
        c.publish_motion(5.0, 0.0, 0.0);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.mode, RobotMode::Init);
        assert_eq!((motors.left, motors.right), (0, 0));
        assert_eq!(motors.writes, 2);
    }

    #[test]
    fn balancing_drives_the_cascade_in_the_transition_cycle() {
        let c = running();
        c.store_command(balance_cmd());
        c.publish_motion(5.0, 0.0, 0.0);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Idle, RobotMode::Balancing)));
        assert!(c.motion().balancing_enabled);
        // first PID call after reset only primes
        assert_eq!(out.cascade_output, 0.0);

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert!(out.cascade_output < 0.0);
        assert_eq!((motors.left, motors.right), (out.left, out.right));
        assert!(motors.left < 0);
    }

    #[test]
    fn turn_command_splits_wheels() {
        let c = running();
        c.store_command(RemoteCommand {
            turn: 40,
            ..balance_cmd()
        });
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        ctl.step(&mut motors, &mut standup, &c, 0.02);
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.cascade_output, 0.0);
        assert_eq!((out.left, out.right), (-20, 20));
    }

    #[test]
    fn falling_over_zeroes_motors() {
        let c = running();
        c.store_command(balance_cmd());
        c.publish_motion(5.0, 0.0, 0.0);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();
        ctl.step(&mut motors, &mut standup, &c, 0.02);
        ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_ne!(motors.left, 0);

        c.publish_motion(50.0, 0.0, 0.0);
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Balancing, RobotMode::Fallen)));
        assert_eq!((motors.left, motors.right), (0, 0));
        assert!(!c.motion().balancing_enabled);

        // upright again, still no automatic recovery
        c.publish_motion(0.0, 0.0, 0.0);
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.mode, RobotMode::Fallen);
    }

    #[test]
    fn standup_request_runs_sequencer_then_returns_to_idle() {
        let c = running();
        c.apply_transition(|_| RobotMode::Fallen);
        c.publish_motion(80.0, 0.0, 0.0);
        c.store_command(RemoteCommand {
            standup_requested: true,
            balance_enabled: false,
            ..RemoteCommand::default()
        });
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Fallen, RobotMode::StandingUp)));
        assert_eq!(standup.requests, 1);
        assert!(!c.standup_pending());

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.mode, RobotMode::StandingUp);
        assert_eq!(standup.requests, 1);

        standup.complete = true;
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::StandingUp, RobotMode::Idle)));
        assert_eq!((motors.left, motors.right), (0, 0));
    }

    #[test]
    fn held_standup_flag_recovers_from_a_second_fall() {
        let c = running();
        let standup_cmd = RemoteCommand {
            standup_requested: true,
            balance_enabled: false,
            ..RemoteCommand::default()
        };
        c.store_command(standup_cmd);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Idle, RobotMode::StandingUp)));
        standup.complete = true;
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::StandingUp, RobotMode::Idle)));
        standup.complete = false;
        standup.in_progress = false;

        // remote keeps sending the same command while the robot tips over again
        c.store_command(standup_cmd);
        c.publish_motion(80.0, 0.0, 0.0);
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Idle, RobotMode::Fallen)));

        c.store_command(standup_cmd);
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Fallen, RobotMode::StandingUp)));
        assert_eq!(standup.requests, 2);
    }

    #[test]
    fn standup_request_during_settle_is_kept() {
        let c = running();
        let mut motors = MockMotors::default();
        let mut standup = MockStandup {
            in_progress: true,
            complete: true,
            ..MockStandup::default()
        };
        let mut ctl = ControlActivity::new();
        c.store_command(RemoteCommand {
            standup_requested: true,
            balance_enabled: false,
            ..RemoteCommand::default()
        });

        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.mode, RobotMode::Idle);
        assert!(c.standup_pending());
        assert_eq!(standup.requests, 0);

        standup.in_progress = false;
        standup.complete = false;
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(out.transition, Some((RobotMode::Idle, RobotMode::StandingUp)));
        assert_eq!(standup.requests, 1);
    }

    #[test]
    fn error_mode_never_drives() {
        let c = running();
        c.apply_transition(|_| RobotMode::Error);
        c.store_command(balance_cmd());
        c.publish_motion(2.0, 0.0, 0.0);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();
        for _ in 0..5 {
            let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
            assert_eq!(out.mode, RobotMode::Error);
            assert_eq!((out.left, out.right), (0, 0));
        }
    }

    #[test]
    fn motor_failure_is_flagged_and_cleared() {
        let c = running();
        let mut motors = MockMotors {
            fail: true,
            ..MockMotors::default()
        };
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(c.faults() & FAULT_MOTOR, FAULT_MOTOR);

        motors.fail = false;
        ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(c.faults() & FAULT_MOTOR, 0);
    }

    #[test]
    fn tuning_changes_reach_the_cascade() {
        let c = running();
        c.store_command(balance_cmd());
        c.publish_motion(25.0, 0.0, 0.0);
        let mut motors = MockMotors::default();
        let mut standup = MockStandup::default();
        let mut ctl = ControlActivity::new();

        ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(c.mode(), RobotMode::Balancing);

        c.update_tuning(|t| t.set(ConfigId::MaxTiltAngle, 20.0));
        let out = ctl.step(&mut motors, &mut standup, &c, 0.02);
        assert_eq!(ctl.cascade().max_tilt_angle(), 20.0);
        assert_eq!(out.transition, Some((RobotMode::Balancing, RobotMode::Fallen)));
    }
}
