//! Collaborator interfaces between the control core and the hardware.
//!
//! The firmware implements these over the STM32 peripherals; tests use
//! in-memory doubles. Reads are synchronous: drivers behind them are
//! blocking register accesses that finish well inside one control period.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left,
    Right,
}

/// One IMU sample: acceleration in g, angular rate in deg/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TiltReading {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsFix {
    /// Decimal degrees, south negative
    pub latitude: f32,
    /// Decimal degrees, west negative
    pub longitude: f32,
    /// Metres above mean sea level
    pub altitude: f32,
    pub satellites: u8,
}

pub trait TiltSensor {
    type Error;

    fn read_tilt(&mut self) -> Result<TiltReading, Self::Error>;
}

/// Cumulative quadrature counts per wheel. Must be callable while an
/// interrupt is updating the counters.
pub trait WheelEncoders {
    fn read_wheel_ticks(&self, side: Side) -> i32;
}

pub trait GpsReceiver {
    /// Latest valid fix, `None` while there is none.
    fn read_gps_fix(&mut self) -> Option<GpsFix>;
}

pub trait MotorDriver {
    type Error;

    /// `duty` in `-255..=255`; the sign selects the direction.
    fn set_motor_duty(&mut self, side: Side, duty: i16) -> Result<(), Self::Error>;
}

pub trait StandupActuator {
    fn set_standup_request(&mut self);
    fn is_standup_in_progress(&self) -> bool;
    fn is_standup_complete(&self) -> bool;
}

/// Message-oriented link towards the remote controller.
pub trait TelemetrySink {
    type Error;

    /// `frame` is one complete encoded protocol message.
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}
