use core::fmt::Write;

use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use balance_bot::activity::TelemetryActivity;
use balance_bot::config::TELEMETRY_LOOP_HZ;

use crate::hw::radio::RadioOutbox;
use crate::usb::UsbSerial;
use crate::Robot;

const USB_DEBUG_ENABLED: bool = true;

/// Telemetry task: one status frame to the radio per second, mirrored as a
/// text line on the USB console when a terminal is attached.
#[task]
pub async fn telemetry_task(mut usb_serial: UsbSerial<'static>, robot: &'static Robot) {
    let mut telemetry = TelemetryActivity::new();
    let mut outbox = RadioOutbox::new();
    let mut ticker = Ticker::every(Duration::from_hz(TELEMETRY_LOOP_HZ));

    loop {
        ticker.next().await;

        let status = match telemetry.step(&mut outbox, &robot.coordinator) {
            Ok(s) => s,
            Err(e) => {
                defmt::warn!("telemetry: status frame not queued ({})", e);
                continue;
            }
        };

        // ── USB Debug ─────────────────────────────────────────────────────
        if USB_DEBUG_ENABLED && usb_serial.dtr() {
            let mut m = heapless::String::<64>::new();
            let _ = write!(
                m,
                "[BOT] m={} a={:.1} v={:.1} gps={} f={:02x}\r\n",
                status.robot_state, status.angle, status.velocity, status.gps_status, status.error_flags
            );
            let _ = usb_serial.write_packet(m.as_bytes()).await;
        }
    }
}
