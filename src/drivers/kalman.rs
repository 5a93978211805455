use micromath::F32Ext;

use crate::config::{KALMAN_Q_ANGLE, KALMAN_Q_BIAS, KALMAN_R_MEASURE};

/// Two-state pitch estimator: angle (deg) and gyro bias (deg/s).
///
/// Fuses the integrated gyro rate with the drift-free but noisy
/// accelerometer angle.
pub struct AngleEstimator {
    angle: f32,
    bias: f32,
    // Last unbiased rate (deg/s)
    rate: f32,

    // Covariance matrix P (2x2)
    p: [[f32; 2]; 2],

    // Process noise: angle scaled by dt², bias scaled by dt
    q_angle: f32,
    q_bias: f32,

    // Measurement noise of the accelerometer angle
    r_measure: f32,
}

impl AngleEstimator {
    pub fn new() -> Self {
        Self {
            angle: 0.0,
            bias: 0.0,
            rate: 0.0,
            p: [[0.0, 0.0], [0.0, 0.0]],
            q_angle: KALMAN_Q_ANGLE,
            q_bias: KALMAN_Q_BIAS,
            r_measure: KALMAN_R_MEASURE,
        }
    }

    /// Seed the angle estimate without touching the covariance.
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    pub fn set_process_noise_angle(&mut self, q_angle: f32) {
        self.q_angle = q_angle;
    }

    pub fn set_process_noise_bias(&mut self, q_bias: f32) {
        self.q_bias = q_bias;
    }

    pub fn set_measurement_noise(&mut self, r_measure: f32) {
        self.r_measure = r_measure;
    }

    /// One predict + correct step.
    ///
    /// `dt` must be positive; it is not guarded here, so `dt <= 0` lets the
    /// covariance lose positive-definiteness.
    pub fn update(&mut self, measured_angle: f32, measured_rate: f32, dt: f32) -> f32 {
        // Predict: integrate the unbiased rate
        self.rate = measured_rate - self.bias;
        self.angle += dt * self.rate;

        // P = F*P*F' + Q with F = [[1, -dt], [0, 1]]
        self.p[0][0] += dt * (dt * self.p[1][1] - self.p[0][1] - self.p[1][0] + self.q_angle);
        self.p[0][1] -= dt * self.p[1][1];
        self.p[1][0] -= dt * self.p[1][1];
        self.p[1][1] += self.q_bias * dt;

        // H = [1, 0]
        let s = self.p[0][0] + self.r_measure;
        let k0 = self.p[0][0] / s;
        let k1 = self.p[1][0] / s;

        let y = measured_angle - self.angle;
        self.angle += k0 * y;
        self.bias += k1 * y;

        // P = (I - KH)P
        let p00 = self.p[0][0];
        let p01 = self.p[0][1];

        self.p[0][0] -= k0 * p00;
        self.p[0][1] -= k0 * p01;
        self.p[1][0] -= k1 * p00;
        self.p[1][1] -= k1 * p01;

        self.angle
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn covariance(&self) -> [[f32; 2]; 2] {
        self.p
    }
}

impl Default for AngleEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pitch (deg) from a gravity vector in g.
pub fn pitch_from_accel(accel: [f32; 3]) -> f32 {
    let [ax, ay, az] = accel;
    (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees()
}
