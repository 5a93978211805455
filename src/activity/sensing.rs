use crate::drivers::encoder::WheelSpeed;
use crate::drivers::kalman::{pitch_from_accel, AngleEstimator};
use crate::hal::{Side, TiltReading, TiltSensor, WheelEncoders};
use crate::state::{ControlCoordinator, FAULT_IMU};

use super::clamp_dt;

/// Averages gyro samples taken at rest into a per-axis bias.
#[derive(Debug, Clone, Copy, Default)]
pub struct GyroCalibrator {
    sum: [f32; 3],
    count: u32,
}

impl GyroCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reading: &TiltReading) {
        for (acc, g) in self.sum.iter_mut().zip(reading.gyro.iter()) {
            *acc += g;
        }
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Zero bias when nothing was sampled.
    pub fn bias(&self) -> [f32; 3] {
        if self.count == 0 {
            return [0.0; 3];
        }
        let n = self.count as f32;
        [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n]
    }
}

/// IMU read, angle estimate and wheel speed, once per sensing period.
pub struct SensingActivity {
    estimator: AngleEstimator,
    left: WheelSpeed,
    right: WheelSpeed,
    gyro_bias: [f32; 3],
    seeded: bool,
    consecutive_failures: u32,
}

impl SensingActivity {
    pub fn new() -> Self {
        Self {
            estimator: AngleEstimator::new(),
            left: WheelSpeed::new(),
            right: WheelSpeed::new(),
            gyro_bias: [0.0; 3],
            seeded: false,
            consecutive_failures: 0,
        }
    }

    pub fn set_gyro_bias(&mut self, bias: [f32; 3]) {
        self.gyro_bias = bias;
    }

    pub fn estimator(&self) -> &AngleEstimator {
        &self.estimator
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the new filtered angle. A failed IMU read skips the whole
    /// cycle: the shared motion state keeps its previous values.
    pub fn step<S, W>(
        &mut self,
        tilt: &mut S,
        encoders: &W,
        coordinator: &ControlCoordinator,
        dt: f32,
        now_ms: u64,
    ) -> Result<f32, S::Error>
    where
        S: TiltSensor,
        W: WheelEncoders,
    {
        let reading = match tilt.read_tilt() {
            Ok(r) => r,
            Err(e) => {
                if self.consecutive_failures == 0 {
                    warn!("imu read failed, skipping cycle");
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                coordinator.raise_fault(FAULT_IMU);
                return Err(e);
            }
        };
        if self.consecutive_failures > 0 {
            info!("imu back after {} failed reads", self.consecutive_failures);
            self.consecutive_failures = 0;
            coordinator.clear_fault(FAULT_IMU);
        }

        let measured_angle = pitch_from_accel(reading.accel);
        let measured_rate = reading.gyro[1] - self.gyro_bias[1];

        if !self.seeded {
            self.estimator.set_angle(measured_angle);
            self.seeded = true;
        }
        let angle = self.estimator.update(measured_angle, measured_rate, clamp_dt(dt));

        let left = self.left.update(encoders.read_wheel_ticks(Side::Left), now_ms);
        let right = self.right.update(encoders.read_wheel_ticks(Side::Right), now_ms);
        let velocity = (left + right) / 2.0;

        coordinator.publish_motion(angle, self.estimator.rate(), velocity);
        Ok(angle)
    }
}

impl Default for SensingActivity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::mocks::{BusError, MockEncoders, MockTilt};
    use crate::config::{ENCODER_PPR, WHEEL_DIAMETER_CM};
    use core::f32::consts::PI;

    #[test]
    fn calibrator_averages_gyro() {
        let mut cal = GyroCalibrator::new();
        assert_eq!(cal.bias(), [0.0; 3]);
        for g in [1.0, 2.0, 3.0] {
            cal.push(&TiltReading {
                accel: [0.0, 0.0, 1.0],
                gyro: [g, -g, 0.5],
            });
        }
        assert_eq!(cal.count(), 3);
        assert_eq!(cal.bias(), [2.0, -2.0, 0.5]);
    }

    #[test]
    fn publishes_tilt_from_accelerometer() {
        let c = ControlCoordinator::new();
        let s = 20.0f32.to_radians();
        let mut imu = MockTilt::tilted([-s.sin(), 0.0, s.cos()], 0.0);
        let enc = MockEncoders::default();
        let mut sensing = SensingActivity::new();

        let mut angle = 0.0;
        for i in 0..50 {
            angle = sensing.step(&mut imu, &enc, &c, 0.02, i * 20).unwrap();
        }
        assert!((angle - 20.0).abs() < 0.5, "angle = {angle}");
        assert_eq!(c.motion().filtered_angle, angle);
    }

    #[test]
    fn gyro_bias_is_removed_from_rate() {
        let c = ControlCoordinator::new();
        let mut imu = MockTilt::tilted([0.0, 0.0, 1.0], 4.0);
        let enc = MockEncoders::default();
        let mut sensing = SensingActivity::new();
        sensing.set_gyro_bias([0.0, 4.0, 0.0]);

        for i in 0..20 {
            sensing.step(&mut imu, &enc, &c, 0.02, i * 20).unwrap();
        }
        assert!(c.motion().filtered_angle.abs() < 1e-3);
        assert!(c.motion().pitch_rate.abs() < 1e-3);
    }

    #[test]
    fn failed_read_skips_cycle_and_flags_fault() {
        let c = ControlCoordinator::new();
        let mut imu = MockTilt::level();
        let enc = MockEncoders::default();
        let mut sensing = SensingActivity::new();

        sensing.step(&mut imu, &enc, &c, 0.02, 0).unwrap();
        c.publish_motion(7.0, 0.0, 0.0);

        imu.queue.push_back(Err(BusError));
        assert_eq!(sensing.step(&mut imu, &enc, &c, 0.02, 20), Err(BusError));
        assert_eq!(c.motion().filtered_angle, 7.0);
        assert_eq!(c.faults() & FAULT_IMU, FAULT_IMU);
        assert_eq!(sensing.consecutive_failures(), 1);

        sensing.step(&mut imu, &enc, &c, 0.02, 40).unwrap();
        assert_eq!(c.faults() & FAULT_IMU, 0);
        assert_eq!(sensing.consecutive_failures(), 0);
    }

    #[test]
    fn velocity_is_mean_of_both_wheels() {
        let c = ControlCoordinator::new();
        let mut imu = MockTilt::level();
        let mut enc = MockEncoders::default();
        let mut sensing = SensingActivity::new();

        sensing.step(&mut imu, &enc, &c, 0.02, 0).unwrap();
        enc.left = ENCODER_PPR;
        enc.right = 0;
        sensing.step(&mut imu, &enc, &c, 0.02, 100).unwrap();

        // one wheel turned once in 100 ms, the other stood still
        let expected = PI * WHEEL_DIAMETER_CM / 0.1 / 2.0;
        let v = c.motion().robot_velocity;
        assert!((v - expected).abs() < 0.1, "v = {v}");
    }
}
