//! Tuning constants and the runtime-adjustable [`Tuning`] set.

// ── Loop rates ────────────────────────────────────────────────────────────────

/// Sensing activity rate (Hz)
pub const SENSOR_LOOP_HZ: u64 = 50;
/// Control activity rate (Hz)
pub const CONTROL_LOOP_HZ: u64 = 50;
/// Telemetry activity rate (Hz)
pub const TELEMETRY_LOOP_HZ: u64 = 1;
/// Nominal control period (s), used when no measured dt is available
pub const NOMINAL_DT: f32 = 1.0 / CONTROL_LOOP_HZ as f32;
/// Measured dt guard band (s)
pub const DT_MIN: f32 = 0.005;
pub const DT_MAX: f32 = 0.1;

// ── Angle estimator ───────────────────────────────────────────────────────────

pub const KALMAN_Q_ANGLE: f32 = 0.001;
pub const KALMAN_Q_BIAS: f32 = 0.003;
pub const KALMAN_R_MEASURE: f32 = 0.03;

// ── Balance cascade ───────────────────────────────────────────────────────────

pub const PITCH_KP: f32 = 50.0;
pub const PITCH_KI: f32 = 0.0;
pub const PITCH_KD: f32 = 2.0;
pub const PITCH_OUTPUT_LIMIT: f32 = 255.0;

pub const VELOCITY_KP: f32 = 1.0;
pub const VELOCITY_KI: f32 = 0.1;
pub const VELOCITY_KD: f32 = 0.0;
/// Velocity loop output is a tilt setpoint (deg)
pub const VELOCITY_OUTPUT_LIMIT: f32 = 10.0;

/// Tilt beyond which the cascade output is cut and the robot counts as fallen (deg)
pub const FALLEN_ANGLE_THRESHOLD: f32 = 45.0;

/// Motor duty range, symmetric
pub const MOTOR_DUTY_MAX: i16 = 255;
/// Remote turn command (±100) to wheel duty offset
pub const TURN_SCALE: f32 = 0.5;
/// Remote speed unit (0..100) to target wheel velocity (cm/s)
pub const DRIVE_VELOCITY_SCALE: f32 = 0.2;

// ── Wheels ────────────────────────────────────────────────────────────────────

pub const WHEEL_DIAMETER_CM: f32 = 6.5;
pub const ENCODER_PPR: i32 = 360;
/// Wheel speed is re-estimated once per window
pub const SPEED_WINDOW_MS: u32 = 100;

// ── Stand-up servo ────────────────────────────────────────────────────────────

pub const SERVO_EXTENDED_ANGLE: u8 = 90;
pub const SERVO_RETRACTED_ANGLE: u8 = 0;
pub const STANDUP_EXTEND_MS: u32 = 1000;
pub const STANDUP_PUSH_MS: u32 = 2000;
pub const STANDUP_RETRACT_MS: u32 = 1000;
/// Hold in Complete before another stand-up may start
pub const STANDUP_SETTLE_MS: u32 = 500;

// ── Startup ───────────────────────────────────────────────────────────────────

pub const MAX_INIT_RETRIES: u8 = 3;
pub const INIT_RETRY_DELAY_MS: u64 = 1000;
pub const GYRO_CALIBRATION_SAMPLES: usize = 100;

/// Gains and limits that may be changed at runtime over the link.
///
/// Never persisted; a restart comes back with [`Tuning::default`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tuning {
    pub pitch: Gains,
    pub velocity: Gains,
    pub max_tilt_angle: f32,
    pub turn_scale: f32,
    pub drive_velocity_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

impl Tuning {
    pub const fn new() -> Self {
        Self {
            pitch: Gains::new(PITCH_KP, PITCH_KI, PITCH_KD),
            velocity: Gains::new(VELOCITY_KP, VELOCITY_KI, VELOCITY_KD),
            max_tilt_angle: FALLEN_ANGLE_THRESHOLD,
            turn_scale: TURN_SCALE,
            drive_velocity_scale: DRIVE_VELOCITY_SCALE,
        }
    }

    /// Read one parameter by its wire id.
    pub fn get(&self, id: ConfigId) -> f32 {
        match id {
            ConfigId::PitchKp => self.pitch.kp,
            ConfigId::PitchKi => self.pitch.ki,
            ConfigId::PitchKd => self.pitch.kd,
            ConfigId::VelocityKp => self.velocity.kp,
            ConfigId::VelocityKi => self.velocity.ki,
            ConfigId::VelocityKd => self.velocity.kd,
            ConfigId::MaxTiltAngle => self.max_tilt_angle,
            ConfigId::TurnScale => self.turn_scale,
            ConfigId::DriveVelocityScale => self.drive_velocity_scale,
        }
    }

    /// Write one parameter by its wire id. Non-finite values are ignored.
    pub fn set(&mut self, id: ConfigId, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        match id {
            ConfigId::PitchKp => self.pitch.kp = value,
            ConfigId::PitchKi => self.pitch.ki = value,
            ConfigId::PitchKd => self.pitch.kd = value,
            ConfigId::VelocityKp => self.velocity.kp = value,
            ConfigId::VelocityKi => self.velocity.ki = value,
            ConfigId::VelocityKd => self.velocity.kd = value,
            ConfigId::MaxTiltAngle => self.max_tilt_angle = value.max(0.0),
            ConfigId::TurnScale => self.turn_scale = value,
            ConfigId::DriveVelocityScale => self.drive_velocity_scale = value,
        }
        true
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameter ids carried in ConfigSet / ConfigGet payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConfigId {
    PitchKp = 0x01,
    PitchKi = 0x02,
    PitchKd = 0x03,
    VelocityKp = 0x04,
    VelocityKi = 0x05,
    VelocityKd = 0x06,
    MaxTiltAngle = 0x07,
    TurnScale = 0x08,
    DriveVelocityScale = 0x09,
}

impl ConfigId {
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::PitchKp),
            0x02 => Some(Self::PitchKi),
            0x03 => Some(Self::PitchKd),
            0x04 => Some(Self::VelocityKp),
            0x05 => Some(Self::VelocityKi),
            0x06 => Some(Self::VelocityKd),
            0x07 => Some(Self::MaxTiltAngle),
            0x08 => Some(Self::TurnScale),
            0x09 => Some(Self::DriveVelocityScale),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_get_set_by_id() {
        let mut t = Tuning::default();
        assert_eq!(t.get(ConfigId::PitchKp), PITCH_KP);
        assert!(t.set(ConfigId::PitchKp, 42.0));
        assert_eq!(t.pitch.kp, 42.0);
        assert_eq!(t.get(ConfigId::PitchKp), 42.0);
    }

    #[test]
    fn tuning_rejects_non_finite() {
        let mut t = Tuning::default();
        assert!(!t.set(ConfigId::TurnScale, f32::NAN));
        assert_eq!(t.turn_scale, TURN_SCALE);
    }

    #[test]
    fn config_id_roundtrip_and_unknown() {
        assert_eq!(ConfigId::from_u8(0x07), Some(ConfigId::MaxTiltAngle));
        assert_eq!(ConfigId::from_u8(ConfigId::VelocityKd as u8), Some(ConfigId::VelocityKd));
        assert_eq!(ConfigId::from_u8(0x00), None);
        assert_eq!(ConfigId::from_u8(0xFF), None);
    }
}
