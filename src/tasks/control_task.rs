use embassy_executor::task;
use embassy_time::{Duration, Instant, Ticker};

use balance_bot::activity::ControlActivity;
use balance_bot::config::CONTROL_LOOP_HZ;

use crate::hw::motor::Motors;
use crate::Robot;

/// Control task: supervisor step then motor output at 50 Hz.
#[task]
pub async fn control_task(mut motors: Motors, robot: &'static Robot) {
    let mut control = ControlActivity::new();
    let mut standup = &robot.standup;
    let mut ticker = Ticker::every(Duration::from_hz(CONTROL_LOOP_HZ));
    let mut last = Instant::now();

    loop {
        ticker.next().await;
        let now = Instant::now();
        let dt = (now - last).as_micros() as f32 * 1e-6;
        last = now;

        control.step(&mut motors, &mut standup, &robot.coordinator, dt);
    }
}
