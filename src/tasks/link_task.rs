use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH2, DMA1_CH4, UART4};
use embassy_stm32::usart::{UartRx, UartTx};

use balance_bot::activity::LinkActivity;
use balance_bot::drivers::protocol::{encode, MAX_FRAME_LEN};
use balance_bot::hal::TelemetrySink;
use balance_bot::state::FAULT_LINK;

use crate::hw::radio::{RadioOutbox, RADIO_OUTBOX};
use crate::Robot;

/// Link RX task: frames from the BLE bridge on UART4, replies queued to
/// the radio outbox.
#[task]
pub async fn link_task(mut rx: UartRx<'static, UART4, DMA1_CH2>, robot: &'static Robot) {
    let mut link = LinkActivity::new();
    let mut outbox = RadioOutbox::new();
    let mut buf = [0u8; 128];
    let mut failing = false;

    loop {
        let n = match rx.read_until_idle(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                if !failing {
                    defmt::warn!("link: uart error {}", defmt::Debug2Format(&e));
                    robot.coordinator.raise_fault(FAULT_LINK);
                }
                link.discard_partial(&robot.coordinator);
                failing = true;
                continue;
            }
        };
        if failing {
            failing = false;
            robot.coordinator.clear_fault(FAULT_LINK);
        }

        for reply in link.handle(&buf[..n], &robot.coordinator) {
            let mut frame = [0u8; MAX_FRAME_LEN];
            let sent = encode(&reply, &mut frame)
                .map_err(|_| ())
                .and_then(|len| outbox.send(&frame[..len]).map_err(|_| ()));
            if sent.is_err() {
                defmt::warn!("link: reply {} dropped", reply.seq_num());
            }
        }
    }
}

/// Single owner of the radio TX half: drains the outbox in order.
#[task]
pub async fn radio_tx_task(mut tx: UartTx<'static, UART4, DMA1_CH4>) {
    let outbox = RADIO_OUTBOX.receiver();
    loop {
        let frame = outbox.receive().await;
        if tx.write(&frame).await.is_err() {
            defmt::warn!("radio: write failed");
        }
    }
}
