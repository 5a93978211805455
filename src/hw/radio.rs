use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use heapless::Vec;

use balance_bot::drivers::protocol::MAX_FRAME_LEN;
use balance_bot::hal::TelemetrySink;

pub type Frame = Vec<u8, MAX_FRAME_LEN>;

pub const OUTBOX_DEPTH: usize = 4;

/// Frames waiting for the radio UART. Telemetry and link replies both go
/// through here so a single task owns the TX half.
pub static RADIO_OUTBOX: Channel<CriticalSectionRawMutex, Frame, OUTBOX_DEPTH> = Channel::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OutboxError {
    Oversized,
    Full,
}

/// Non-blocking [`TelemetrySink`] over the radio outbox.
#[derive(Clone, Copy)]
pub struct RadioOutbox {
    tx: Sender<'static, CriticalSectionRawMutex, Frame, OUTBOX_DEPTH>,
}

impl RadioOutbox {
    pub fn new() -> Self {
        Self {
            tx: RADIO_OUTBOX.sender(),
        }
    }
}

impl TelemetrySink for RadioOutbox {
    type Error = OutboxError;

    fn send(&mut self, frame: &[u8]) -> Result<(), OutboxError> {
        let frame = Frame::from_slice(frame).map_err(|_| OutboxError::Oversized)?;
        self.tx.try_send(frame).map_err(|_| OutboxError::Full)
    }
}
