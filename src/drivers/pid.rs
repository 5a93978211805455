/// Single-loop PID with a clamped integral and a clamped output.
///
/// The integral shares the output bounds (anti-windup by direct clamp).
/// The first `compute` after construction or [`Pid::reset`] only records
/// the error and returns 0, so the derivative never sees an undefined
/// previous error.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    setpoint: f32,
    integral: f32,
    previous_error: f32,
    output: f32,
    output_min: f32,
    output_max: f32,
    first_run: bool,
}

impl Pid {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint: 0.0,
            integral: 0.0,
            previous_error: 0.0,
            output: 0.0,
            output_min: -255.0,
            output_max: 255.0,
            first_run: true,
        }
    }

    pub fn set_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    /// Change the bounds and pull the current output and integral inside them.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        self.output_min = min;
        self.output_max = max;
        self.output = self.clamp(self.output);
        self.integral = self.clamp(self.integral);
    }

    pub fn compute(&mut self, input: f32, dt: f32) -> f32 {
        if self.first_run {
            self.previous_error = self.setpoint - input;
            self.first_run = false;
            return 0.0;
        }

        if !(dt > 0.0) {
            return self.output;
        }

        let error = self.setpoint - input;

        self.integral = self.clamp(self.integral + error * dt);
        let derivative = (error - self.previous_error) / dt;

        self.output = self.clamp(self.kp * error + self.ki * self.integral + self.kd * derivative);
        self.previous_error = error;

        self.output
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.output = 0.0;
        self.first_run = true;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn output_limits(&self) -> (f32, f32) {
        (self.output_min, self.output_max)
    }

    // NaN collapses to the lower bound so the invariant holds for any input.
    fn clamp(&self, value: f32) -> f32 {
        if value > self.output_max {
            self.output_max
        } else if value >= self.output_min {
            value
        } else {
            self.output_min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed(kp: f32, ki: f32, kd: f32) -> Pid {
        let mut pid = Pid::new(kp, ki, kd);
        pid.set_setpoint(10.0);
        assert_eq!(pid.compute(0.0, 0.02), 0.0);
        pid
    }

    #[test]
    fn first_compute_after_reset_is_zero() {
        let mut pid = Pid::new(5.0, 1.0, 0.5);
        pid.set_setpoint(100.0);
        assert_eq!(pid.compute(0.0, 0.02), 0.0);
        assert_ne!(pid.compute(0.0, 0.02), 0.0);

        pid.reset();
        assert_eq!(pid.compute(-50.0, 0.02), 0.0);
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn proportional_response() {
        let mut pid = primed(2.0, 0.0, 0.0);
        assert!((pid.compute(4.0, 0.02) - 12.0).abs() < 1e-4);
    }

    #[test]
    fn derivative_uses_previous_error() {
        let mut pid = primed(0.0, 0.0, 1.0);
        // error goes 10 -> 8 over 0.1 s
        assert!((pid.compute(2.0, 0.1) + 20.0).abs() < 1e-3);
    }

    #[test]
    fn integral_is_clamped_to_output_bounds() {
        let mut pid = primed(0.0, 1.0, 0.0);
        pid.set_output_limits(-5.0, 5.0);
        for _ in 0..1000 {
            pid.compute(0.0, 0.1);
        }
        assert_eq!(pid.integral(), 5.0);
        assert_eq!(pid.output(), 5.0);

        // wound up integral unwinds as soon as the error flips
        pid.set_setpoint(-10.0);
        let out = pid.compute(0.0, 0.1);
        assert!(out < 5.0);
    }

    #[test]
    fn output_always_within_limits() {
        let mut pid = Pid::new(80.0, 3.0, 4.0);
        pid.set_output_limits(-100.0, 60.0);
        pid.set_setpoint(0.0);
        let inputs = [1e6, -1e6, 3.0, -7.5, 0.0, 250.0, -0.001, 1e-9, -4e4, f32::NAN, 9.0];
        let dts = [0.02, 0.001, 1.0, 1e-6, 0.5];
        for (i, x) in inputs.iter().cycle().take(200).enumerate() {
            let out = pid.compute(*x, dts[i % dts.len()]);
            assert!((-100.0..=60.0).contains(&out), "out = {out}");
            assert!((-100.0..=60.0).contains(&pid.integral()));
        }
    }

    #[test]
    fn non_positive_dt_returns_last_output() {
        let mut pid = primed(1.0, 0.0, 0.0);
        let out = pid.compute(3.0, 0.02);
        assert_eq!(pid.compute(-400.0, 0.0), out);
        assert_eq!(pid.compute(-400.0, -1.0), out);
    }

    #[test]
    fn narrowing_limits_reclamps_state() {
        let mut pid = primed(0.0, 10.0, 0.0);
        for _ in 0..50 {
            pid.compute(0.0, 0.1);
        }
        assert!(pid.output() > 20.0);
        pid.set_output_limits(-20.0, 20.0);
        assert_eq!(pid.output(), 20.0);
        assert_eq!(pid.integral(), 20.0);
    }
}
