//! Framed binary protocol between the robot and the remote controller.
//!
//! `[0xAA] [version] [type] [seq] [len u16 LE] [crc u16 LE] [payload ...]`
//!
//! The checksum is the last header field, so it covers the payload bytes.
//! All multi-byte fields are little endian with no padding.

use heapless::Vec;

pub const START_MARKER: u8 = 0xAA;
pub const PROTOCOL_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;
pub const MAX_PAYLOAD_LEN: usize = 64;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

pub const MSG_TYPE_MOVE_CMD: u8 = 0x01;
pub const MSG_TYPE_STATUS_REQ: u8 = 0x02;
pub const MSG_TYPE_STATUS_RESP: u8 = 0x03;
pub const MSG_TYPE_CONFIG_SET: u8 = 0x04;
pub const MSG_TYPE_CONFIG_GET: u8 = 0x05;
pub const MSG_TYPE_ERROR: u8 = 0xFF;

pub const CMD_FLAG_BALANCE: u8 = 0x01;
pub const CMD_FLAG_STANDUP: u8 = 0x02;
pub const CMD_FLAG_EMERGENCY: u8 = 0x04;

pub const MOVE_PAYLOAD_LEN: usize = 8;
pub const STATUS_PAYLOAD_LEN: usize = 20;
pub const CONFIG_PAYLOAD_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Output buffer cannot hold the encoded frame
    BufferTooSmall,
    /// Input ends before the header or the declared payload
    Truncated,
    BadStartMarker,
    BadVersion,
    /// Declared payload length above [`MAX_PAYLOAD_LEN`]
    PayloadTooLarge,
    ChecksumMismatch,
}

/// Error codes carried by [`MSG_TYPE_ERROR`] messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    UnknownType = 0x01,
    BadPayload = 0x02,
    UnknownConfigId = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub start_marker: u8,
    pub version: u8,
    pub msg_type: u8,
    pub seq_num: u8,
    pub payload_len: u16,
    pub checksum: u16,
}

impl Header {
    fn new(msg_type: u8, seq_num: u8, payload_len: usize) -> Self {
        Self {
            start_marker: START_MARKER,
            version: PROTOCOL_VERSION,
            msg_type,
            seq_num,
            payload_len: payload_len as u16,
            checksum: 0,
        }
    }

    fn write(&self, out: &mut [u8]) {
        out[0] = self.start_marker;
        out[1] = self.version;
        out[2] = self.msg_type;
        out[3] = self.seq_num;
        out[4..6].copy_from_slice(&self.payload_len.to_le_bytes());
        out[6..8].copy_from_slice(&self.checksum.to_le_bytes());
    }

    fn read(bytes: &[u8]) -> Self {
        Self {
            start_marker: bytes[0],
            version: bytes[1],
            msg_type: bytes[2],
            seq_num: bytes[3],
            payload_len: u16::from_le_bytes([bytes[4], bytes[5]]),
            checksum: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MovePayload {
    pub direction: i8,
    pub turn: i8,
    pub speed: u8,
    pub flags: u8,
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusPayload {
    pub angle: f32,
    pub velocity: f32,
    pub robot_state: u8,
    pub gps_status: u8,
    pub latitude: f32,
    pub longitude: f32,
    pub battery_level: u8,
    pub error_flags: u8,
}

impl StatusPayload {
    /// Status with no GPS fix, full battery and no errors.
    pub fn new(angle: f32, velocity: f32, robot_state: u8) -> Self {
        Self {
            angle,
            velocity,
            robot_state,
            gps_status: 0,
            latitude: 0.0,
            longitude: 0.0,
            battery_level: 100,
            error_flags: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigPayload {
    pub config_id: u8,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Move(MovePayload),
    Status(StatusPayload),
    Config(ConfigPayload),
    Raw(Vec<u8, MAX_PAYLOAD_LEN>),
}

impl Payload {
    /// Serialise into `out` (at least [`MAX_PAYLOAD_LEN`] bytes), returning the byte count.
    fn write(&self, out: &mut [u8]) -> usize {
        match self {
            Payload::Move(m) => {
                out[0] = m.direction as u8;
                out[1] = m.turn as u8;
                out[2] = m.speed;
                out[3] = m.flags;
                out[4..8].copy_from_slice(&m.timestamp.to_le_bytes());
                MOVE_PAYLOAD_LEN
            }
            Payload::Status(s) => {
                out[0..4].copy_from_slice(&s.angle.to_le_bytes());
                out[4..8].copy_from_slice(&s.velocity.to_le_bytes());
                out[8] = s.robot_state;
                out[9] = s.gps_status;
                out[10..14].copy_from_slice(&s.latitude.to_le_bytes());
                out[14..18].copy_from_slice(&s.longitude.to_le_bytes());
                out[18] = s.battery_level;
                out[19] = s.error_flags;
                STATUS_PAYLOAD_LEN
            }
            Payload::Config(c) => {
                out[0] = c.config_id;
                out[1..5].copy_from_slice(&c.value.to_le_bytes());
                CONFIG_PAYLOAD_LEN
            }
            Payload::Raw(raw) => {
                out[..raw.len()].copy_from_slice(raw);
                raw.len()
            }
        }
    }

    /// Pick the typed layout from the message type and length; anything
    /// unrecognised is kept as raw bytes.
    fn read(msg_type: u8, bytes: &[u8]) -> Self {
        match (msg_type, bytes.len()) {
            (MSG_TYPE_MOVE_CMD, MOVE_PAYLOAD_LEN) => Payload::Move(MovePayload {
                direction: bytes[0] as i8,
                turn: bytes[1] as i8,
                speed: bytes[2],
                flags: bytes[3],
                timestamp: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            }),
            (MSG_TYPE_STATUS_RESP, STATUS_PAYLOAD_LEN) => Payload::Status(StatusPayload {
                angle: f32_le(&bytes[0..4]),
                velocity: f32_le(&bytes[4..8]),
                robot_state: bytes[8],
                gps_status: bytes[9],
                latitude: f32_le(&bytes[10..14]),
                longitude: f32_le(&bytes[14..18]),
                battery_level: bytes[18],
                error_flags: bytes[19],
            }),
            (MSG_TYPE_CONFIG_SET | MSG_TYPE_CONFIG_GET, CONFIG_PAYLOAD_LEN) => {
                Payload::Config(ConfigPayload {
                    config_id: bytes[0],
                    value: f32_le(&bytes[1..5]),
                })
            }
            _ => {
                let mut raw = Vec::new();
                // bytes.len() <= MAX_PAYLOAD_LEN is checked by decode
                let _ = raw.extend_from_slice(bytes);
                Payload::Raw(raw)
            }
        }
    }
}

fn f32_le(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub header: Header,
    pub payload: Payload,
}

impl ProtocolMessage {
    fn build(msg_type: u8, seq_num: u8, payload: Payload) -> Self {
        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        let len = payload.write(&mut buf);
        let mut msg = Self {
            header: Header::new(msg_type, seq_num, len),
            payload,
        };
        msg.refresh_checksum();
        msg
    }

    /// Payload bytes as they go on the wire, `payload_len` long.
    ///
    /// Bytes past the typed layout read as zero.
    pub fn payload_bytes(&self) -> ([u8; MAX_PAYLOAD_LEN], usize) {
        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        self.payload.write(&mut buf);
        let len = (self.header.payload_len as usize).min(MAX_PAYLOAD_LEN);
        (buf, len)
    }

    pub fn compute_checksum(&self) -> u16 {
        let (buf, len) = self.payload_bytes();
        checksum(&buf[..len])
    }

    /// Recompute the checksum; required after any payload edit.
    pub fn refresh_checksum(&mut self) {
        self.header.checksum = self.compute_checksum();
    }

    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.header.payload_len as usize
    }

    pub fn msg_type(&self) -> u8 {
        self.header.msg_type
    }

    pub fn seq_num(&self) -> u8 {
        self.header.seq_num
    }
}

/// CRC-16, reflected polynomial 0xA001, initial value 0xFFFF, bit-serial.
pub fn checksum(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

pub fn validate(msg: &ProtocolMessage) -> bool {
    check(msg).is_ok()
}

fn check(msg: &ProtocolMessage) -> Result<(), ProtocolError> {
    if msg.header.start_marker != START_MARKER {
        return Err(ProtocolError::BadStartMarker);
    }
    if msg.header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion);
    }
    if msg.header.payload_len as usize > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge);
    }
    if msg.compute_checksum() != msg.header.checksum {
        return Err(ProtocolError::ChecksumMismatch);
    }
    Ok(())
}

/// Write `msg` into `buf`, returning the frame length.
pub fn encode(msg: &ProtocolMessage, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let payload_len = msg.header.payload_len as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let total = HEADER_LEN + payload_len;
    if buf.len() < total {
        return Err(ProtocolError::BufferTooSmall);
    }

    msg.header.write(&mut buf[..HEADER_LEN]);
    let (payload, len) = msg.payload_bytes();
    buf[HEADER_LEN..total].copy_from_slice(&payload[..len]);

    Ok(total)
}

/// Parse one frame from the start of `buf`. Trailing bytes are ignored.
pub fn decode(buf: &[u8]) -> Result<ProtocolMessage, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }
    let header = Header::read(buf);

    if header.start_marker != START_MARKER {
        return Err(ProtocolError::BadStartMarker);
    }
    let payload_len = header.payload_len as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let total = HEADER_LEN + payload_len;
    if buf.len() < total {
        return Err(ProtocolError::Truncated);
    }

    let msg = ProtocolMessage {
        header,
        payload: Payload::read(header.msg_type, &buf[HEADER_LEN..total]),
    };
    check(&msg)?;
    Ok(msg)
}

// ── Builders ──────────────────────────────────────────────────────────────────

pub fn build_move_command(
    direction: i8,
    turn: i8,
    speed: u8,
    flags: u8,
    seq_num: u8,
) -> ProtocolMessage {
    ProtocolMessage::build(
        MSG_TYPE_MOVE_CMD,
        seq_num,
        Payload::Move(MovePayload {
            direction,
            turn,
            speed,
            flags,
            timestamp: 0,
        }),
    )
}

pub fn build_status_request(seq_num: u8) -> ProtocolMessage {
    ProtocolMessage::build(MSG_TYPE_STATUS_REQ, seq_num, Payload::Raw(Vec::new()))
}

pub fn build_status_response(status: StatusPayload, seq_num: u8) -> ProtocolMessage {
    ProtocolMessage::build(MSG_TYPE_STATUS_RESP, seq_num, Payload::Status(status))
}

/// ConfigSet / ConfigGet message carrying one parameter.
pub fn build_config_message(msg_type: u8, config_id: u8, value: f32, seq_num: u8) -> ProtocolMessage {
    ProtocolMessage::build(msg_type, seq_num, Payload::Config(ConfigPayload { config_id, value }))
}

pub fn build_error_message(error_code: u8, seq_num: u8) -> ProtocolMessage {
    let mut raw = Vec::new();
    let _ = raw.push(error_code);
    ProtocolMessage::build(MSG_TYPE_ERROR, seq_num, Payload::Raw(raw))
}

// ── Stream framing ────────────────────────────────────────────────────────────

/// Reassembles frames from a byte stream that may split or merge them.
///
/// Bytes before a start marker are skipped. When a candidate frame fails to
/// decode, its first byte is dropped and scanning resumes at the next marker.
pub struct FrameAssembler {
    buffer: Vec<u8, MAX_FRAME_LEN>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_byte(&mut self, b: u8) -> Option<Result<ProtocolMessage, ProtocolError>> {
        if self.buffer.is_empty() && b != START_MARKER {
            return None;
        }
        if self.buffer.push(b).is_err() {
            self.resync();
            return Some(Err(ProtocolError::PayloadTooLarge));
        }
        self.poll()
    }

    /// Feed a chunk, reporting every completed (or rejected) frame.
    pub fn push_bytes(
        &mut self,
        data: &[u8],
        mut on_frame: impl FnMut(Result<ProtocolMessage, ProtocolError>),
    ) {
        for &b in data {
            if let Some(res) = self.push_byte(b) {
                on_frame(res);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn poll(&mut self) -> Option<Result<ProtocolMessage, ProtocolError>> {
        if self.buffer.len() < 6 {
            return None;
        }
        let payload_len = u16::from_le_bytes([self.buffer[4], self.buffer[5]]) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            self.resync();
            return Some(Err(ProtocolError::PayloadTooLarge));
        }
        let total = HEADER_LEN + payload_len;
        if self.buffer.len() < total {
            return None;
        }

        let result = decode(&self.buffer);
        match result {
            Ok(_) => self.consume(total),
            Err(_) => self.resync(),
        }
        Some(result)
    }

    fn consume(&mut self, n: usize) {
        let rest: Vec<u8, MAX_FRAME_LEN> = Vec::from_slice(&self.buffer[n..]).unwrap_or_default();
        self.buffer = rest;
    }

    fn resync(&mut self) {
        match self.buffer.iter().skip(1).position(|&b| b == START_MARKER) {
            Some(i) => self.consume(i + 1),
            None => self.buffer.clear(),
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
