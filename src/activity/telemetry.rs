use crate::drivers::protocol::{
    build_status_response, encode, ProtocolError, StatusPayload, MAX_FRAME_LEN,
};
use crate::hal::TelemetrySink;
use crate::state::{ControlCoordinator, StatusSnapshot};

/// `gps_status` bit set while the receiver has a fix
pub const GPS_STATUS_FIX: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError<E> {
    Encode(ProtocolError),
    Send(E),
}

impl<E> From<ProtocolError> for TelemetryError<E> {
    fn from(e: ProtocolError) -> Self {
        TelemetryError::Encode(e)
    }
}

pub fn status_payload(snapshot: &StatusSnapshot) -> StatusPayload {
    let mut status = StatusPayload::new(
        snapshot.motion.filtered_angle,
        snapshot.motion.robot_velocity,
        snapshot.mode.as_u8(),
    );
    if let Some(fix) = snapshot.gps {
        status.gps_status = GPS_STATUS_FIX;
        status.latitude = fix.latitude;
        status.longitude = fix.longitude;
    }
    status.battery_level = snapshot.battery_level;
    status.error_flags = snapshot.faults;
    status
}

/// Unsolicited status report, once per telemetry period.
pub struct TelemetryActivity {
    seq: u8,
}

impl TelemetryActivity {
    pub fn new() -> Self {
        Self { seq: 0 }
    }

    /// Sequence number the next report will carry.
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    pub fn step<T: TelemetrySink>(
        &mut self,
        sink: &mut T,
        coordinator: &ControlCoordinator,
    ) -> Result<StatusPayload, TelemetryError<T::Error>> {
        let snapshot = coordinator.snapshot();
        let status = status_payload(&snapshot);

        info!(
            "angle: {} | velocity: {} | mode: {} | gps: {}",
            status.angle,
            status.velocity,
            snapshot.mode.name(),
            if snapshot.gps.is_some() { "valid" } else { "invalid" }
        );

        let msg = build_status_response(status, self.seq);
        self.seq = self.seq.wrapping_add(1);

        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = encode(&msg, &mut buf)?;
        sink.send(&buf[..len]).map_err(TelemetryError::Send)?;
        Ok(status)
    }
}

impl Default for TelemetryActivity {
    fn default() -> Self {
        Self::new()
    }
}
