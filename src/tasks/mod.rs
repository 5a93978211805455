pub mod control_task;
pub mod encoder_task;
pub mod gps_task;
pub mod link_task;
pub mod sensor_task;
pub mod standup_task;
pub mod telemetry_task;
