use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH1, DMA1_CH3, USART3};
use embassy_stm32::usart::Uart;
use embassy_time::{Duration, Timer};

use balance_bot::drivers::gps::NmeaGga;
use balance_bot::hal::GpsReceiver;
use balance_bot::state::FAULT_GPS;

use crate::Robot;

/// Receiver talks at 1 Hz; this many silent windows drop the fix.
const SILENT_WINDOWS_MAX: u8 = 3;

/// GPS task: reads NMEA bursts from USART3 and publishes the latest fix.
#[task]
pub async fn gps_task(mut gps_uart: Uart<'static, USART3, DMA1_CH3, DMA1_CH1>, robot: &'static Robot) {
    let mut parser = NmeaGga::new();
    let mut buf = [0u8; 512];
    let mut silent: u8 = 0;

    loop {
        match select(
            gps_uart.read_until_idle(&mut buf),
            Timer::after(Duration::from_millis(1100)),
        )
        .await
        {
            Either::First(Ok(n)) => {
                parser.push_data(&buf[..n]);
                robot.coordinator.set_gps_fix(parser.read_gps_fix());
                if silent >= SILENT_WINDOWS_MAX {
                    defmt::info!("gps: receiver back");
                    robot.coordinator.clear_fault(FAULT_GPS);
                }
                silent = 0;
            }
            Either::First(Err(_)) | Either::Second(_) => {
                silent = silent.saturating_add(1);
                if silent == SILENT_WINDOWS_MAX {
                    let stats = parser.stats();
                    defmt::warn!(
                        "gps: no data ({} sentences, {} bad checksums)",
                        stats.sentences_rx,
                        stats.checksum_errors
                    );
                    robot.coordinator.set_gps_fix(None);
                    robot.coordinator.raise_fault(FAULT_GPS);
                }
            }
        }
    }
}
