use micromath::F32Ext;

use crate::config::{
    Gains, Tuning, FALLEN_ANGLE_THRESHOLD, MOTOR_DUTY_MAX, PITCH_KD, PITCH_KI, PITCH_KP,
    PITCH_OUTPUT_LIMIT, VELOCITY_KD, VELOCITY_KI, VELOCITY_KP, VELOCITY_OUTPUT_LIMIT,
};
use crate::drivers::pid::Pid;

/// Velocity loop feeding the pitch loop.
///
/// The velocity loop turns the wheel speed error into a tilt setpoint and
/// the pitch loop turns the tilt error into a single differential motor
/// command. Beyond `max_tilt_angle` the output is cut to zero without
/// touching either loop.
pub struct BalanceCascade {
    pitch: Pid,
    velocity: Pid,
    target_velocity: f32,
    max_tilt_angle: f32,
}

impl BalanceCascade {
    pub fn new() -> Self {
        let mut pitch = Pid::new(PITCH_KP, PITCH_KI, PITCH_KD);
        pitch.set_output_limits(-PITCH_OUTPUT_LIMIT, PITCH_OUTPUT_LIMIT);

        let mut velocity = Pid::new(VELOCITY_KP, VELOCITY_KI, VELOCITY_KD);
        velocity.set_output_limits(-VELOCITY_OUTPUT_LIMIT, VELOCITY_OUTPUT_LIMIT);

        Self {
            pitch,
            velocity,
            target_velocity: 0.0,
            max_tilt_angle: FALLEN_ANGLE_THRESHOLD,
        }
    }

    pub fn set_balance_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.pitch.set_tunings(kp, ki, kd);
    }

    pub fn set_velocity_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.velocity.set_tunings(kp, ki, kd);
    }

    /// Apply gains and the tilt limit from a runtime [`Tuning`].
    pub fn apply_tuning(&mut self, tuning: &Tuning) {
        let Gains { kp, ki, kd } = tuning.pitch;
        self.set_balance_tunings(kp, ki, kd);
        let Gains { kp, ki, kd } = tuning.velocity;
        self.set_velocity_tunings(kp, ki, kd);
        self.set_max_tilt_angle(tuning.max_tilt_angle);
    }

    pub fn set_target_velocity(&mut self, velocity: f32) {
        self.target_velocity = velocity;
        self.velocity.set_setpoint(velocity);
    }

    pub fn set_max_tilt_angle(&mut self, angle: f32) {
        self.max_tilt_angle = angle;
    }

    pub fn target_velocity(&self) -> f32 {
        self.target_velocity
    }

    pub fn max_tilt_angle(&self) -> f32 {
        self.max_tilt_angle
    }

    /// `gyro_rate` is accepted for parity with the sensor data but the pitch
    /// loop differentiates its own error.
    pub fn compute(
        &mut self,
        current_angle: f32,
        _gyro_rate: f32,
        current_velocity: f32,
        dt: f32,
    ) -> f32 {
        if !(current_angle.abs() <= self.max_tilt_angle) {
            return 0.0;
        }

        self.velocity.set_setpoint(self.target_velocity);
        let velocity_adjustment = self.velocity.compute(current_velocity, dt);

        self.pitch.set_setpoint(velocity_adjustment);
        self.pitch.compute(current_angle, dt)
    }

    pub fn reset(&mut self) {
        self.pitch.reset();
        self.velocity.reset();
    }

    pub fn pitch_loop(&self) -> &Pid {
        &self.pitch
    }

    pub fn velocity_loop(&self) -> &Pid {
        &self.velocity
    }
}

impl Default for BalanceCascade {
    fn default() -> Self {
        Self::new()
    }
}

/// Split the cascade output into (left, right) wheel duties.
pub fn mix_wheels(output: f32, turn: i8, turn_scale: f32) -> (i16, i16) {
    let turn_adjustment = turn as f32 * turn_scale;
    (
        to_duty(output - turn_adjustment),
        to_duty(output + turn_adjustment),
    )
}

fn to_duty(value: f32) -> i16 {
    let max = MOTOR_DUTY_MAX as f32;
    if value.is_nan() {
        return 0;
    }
    value.clamp(-max, max) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_zero_beyond_tilt_limit() {
        let mut cascade = BalanceCascade::new();
        for angle in [45.01f32, -45.01, 60.0, -90.0, 180.0] {
            for (rate, vel) in [(0.0, 0.0), (300.0, -50.0), (-300.0, 80.0)] {
                assert_eq!(cascade.compute(angle, rate, vel, 0.02), 0.0);
            }
        }
    }

    #[test]
    fn fallen_cycles_leave_loop_state_untouched() {
        let mut cascade = BalanceCascade::new();
        cascade.compute(5.0, 0.0, 0.0, 0.02);
        cascade.compute(4.0, 0.0, 0.0, 0.02);
        let pitch = cascade.pitch_loop().output();
        let integral = cascade.velocity_loop().integral();

        cascade.compute(70.0, 0.0, 3.0, 0.02);
        assert_eq!(cascade.pitch_loop().output(), pitch);
        assert_eq!(cascade.velocity_loop().integral(), integral);

        // Back within bounds: the loops act immediately, no priming cycle
        assert_ne!(cascade.compute(4.0, 0.0, 0.0, 0.02), 0.0);
    }

    #[test]
    fn leaning_forward_drives_forward_correction() {
        let mut cascade = BalanceCascade::new();
        cascade.compute(0.0, 0.0, 0.0, 0.02);
        // positive tilt, setpoint ~0 => negative error => negative command
        let out = cascade.compute(5.0, 0.0, 0.0, 0.02);
        assert!(out < 0.0, "out = {out}");
        let out = cascade.compute(-5.0, 0.0, 0.0, 0.02);
        assert!(out > 0.0, "out = {out}");
    }

    #[test]
    fn velocity_output_becomes_pitch_setpoint() {
        let mut cascade = BalanceCascade::new();
        cascade.set_target_velocity(20.0);
        cascade.compute(0.0, 0.0, 0.0, 0.02);
        cascade.compute(0.0, 0.0, 0.0, 0.02);
        let tilt_setpoint = cascade.velocity_loop().output();
        assert!(tilt_setpoint > 0.0);
        assert_eq!(cascade.pitch_loop().setpoint(), tilt_setpoint);
        assert!(tilt_setpoint <= VELOCITY_OUTPUT_LIMIT);
    }

    #[test]
    fn reset_reprimes_both_loops() {
        let mut cascade = BalanceCascade::new();
        cascade.compute(3.0, 0.0, 1.0, 0.02);
        cascade.compute(2.0, 0.0, 1.0, 0.02);
        cascade.reset();
        assert_eq!(cascade.compute(2.0, 0.0, 1.0, 0.02), 0.0);
    }

    #[test]
    fn apply_tuning_updates_tilt_limit() {
        let mut cascade = BalanceCascade::new();
        let mut tuning = Tuning::default();
        tuning.max_tilt_angle = 20.0;
        cascade.apply_tuning(&tuning);
        assert_eq!(cascade.max_tilt_angle(), 20.0);
        assert_eq!(cascade.compute(25.0, 0.0, 0.0, 0.02), 0.0);
    }

    #[test]
    fn wheel_mix_applies_turn_and_clamps() {
        assert_eq!(mix_wheels(100.0, 30, 0.5), (85, 115));
        assert_eq!(mix_wheels(0.0, -100, 0.5), (50, -50));
        assert_eq!(mix_wheels(250.0, 100, 0.5), (200, 255));
        assert_eq!(mix_wheels(-300.0, 0, 0.5), (-255, -255));
        assert_eq!(mix_wheels(f32::NAN, 10, 0.5), (0, 0));
    }
}
