use embassy_executor::task;
use embassy_time::{Duration, Instant, Ticker};

use balance_bot::activity::SensingActivity;
use balance_bot::config::SENSOR_LOOP_HZ;

use crate::hw::mpu6050::Mpu6050;
use crate::Robot;

/// Sensing task: IMU, angle estimate and wheel speed at 50 Hz.
/// A failed read leaves the previous motion state in place.
#[task]
pub async fn sensor_task(mut imu: Mpu6050, mut sensing: SensingActivity, robot: &'static Robot) {
    let mut ticker = Ticker::every(Duration::from_hz(SENSOR_LOOP_HZ));
    let mut last = Instant::now();

    loop {
        ticker.next().await;
        let now = Instant::now();
        let dt = (now - last).as_micros() as f32 * 1e-6;
        last = now;

        let _ = sensing.step(
            &mut imu,
            robot.coordinator.wheel_ticks(),
            &robot.coordinator,
            dt,
            now.as_millis(),
        );
    }
}
