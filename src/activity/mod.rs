//! Bodies of the periodic activities.
//!
//! Each `step` is one period's work over the [`crate::hal`] traits and the
//! [`ControlCoordinator`](crate::state::ControlCoordinator). The firmware
//! calls them from embassy `Ticker` loops; tests call them directly.

pub mod control;
pub mod link;
pub mod sensing;
pub mod telemetry;

pub use control::{ControlActivity, ControlOutput};
pub use link::LinkActivity;
pub use sensing::{GyroCalibrator, SensingActivity};
pub use telemetry::{status_payload, TelemetryActivity, TelemetryError};

use crate::config::{DT_MAX, DT_MIN, NOMINAL_DT};

/// Bound a measured loop period to `[DT_MIN, DT_MAX]`; non-finite or
/// non-positive values fall back to the nominal period.
pub fn clamp_dt(dt: f32) -> f32 {
    if !(dt > 0.0) || !dt.is_finite() {
        return NOMINAL_DT;
    }
    dt.clamp(DT_MIN, DT_MAX)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_bounded() {
        assert_eq!(clamp_dt(0.02), 0.02);
        assert_eq!(clamp_dt(0.0001), DT_MIN);
        assert_eq!(clamp_dt(3.0), DT_MAX);
        assert_eq!(clamp_dt(0.0), NOMINAL_DT);
        assert_eq!(clamp_dt(-1.0), NOMINAL_DT);
        assert_eq!(clamp_dt(f32::NAN), NOMINAL_DT);
        assert_eq!(clamp_dt(f32::INFINITY), NOMINAL_DT);
    }
}
