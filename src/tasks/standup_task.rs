use embassy_executor::task;
use embassy_time::{Duration, Instant, Ticker};

use crate::hw::servo::Servo;
use crate::Robot;

const SERVO_UPDATE_HZ: u64 = 50;

/// Advances the stand-up sequencer and follows its angle with the servo.
/// An emergency stop aborts a running sequence and retracts the arm.
#[task]
pub async fn standup_task(mut servo: Servo, robot: &'static Robot) {
    let mut ticker = Ticker::every(Duration::from_hz(SERVO_UPDATE_HZ));
    loop {
        ticker.next().await;
        if robot.coordinator.command().emergency_stop {
            robot.standup.reset();
        }
        let angle = robot.standup.update(Instant::now().as_millis());
        servo.set_angle(angle);
    }
}
