pub mod balance;
pub mod encoder;
pub mod gps;
pub mod kalman;
pub mod motor;
pub mod pid;
pub mod protocol;
pub mod remote;
pub mod standup;
