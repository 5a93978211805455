#![cfg_attr(not(test), no_std)]

//! Control core of a two-wheeled self-balancing robot.
//!
//! Everything in here is hardware independent: the firmware binary
//! (`src/main.rs`) supplies the STM32 peripherals through the traits in
//! [`hal`] and runs the [`activity`] bodies from embassy tasks.
//!
//! - [`drivers`]: estimator, PID cascade, wire protocol, remote command,
//!   encoder, stand-up sequencer and GPS parsing
//! - [`supervisor`]: operating mode state machine
//! - [`state`]: shared state between the periodic activities
//! - [`health`]: component initialisation policy

#[macro_use]
pub mod log;

pub mod activity;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod health;
pub mod state;
pub mod supervisor;
