//! STM32 implementations of the control core's hardware traits.

pub mod motor;
pub mod mpu6050;
pub mod radio;
pub mod servo;
