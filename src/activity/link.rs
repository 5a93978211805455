use heapless::Vec;

use crate::config::ConfigId;
use crate::drivers::protocol::{
    build_config_message, build_error_message, build_status_response, ErrorCode, FrameAssembler,
    Payload, ProtocolMessage, MSG_TYPE_CONFIG_GET, MSG_TYPE_CONFIG_SET, MSG_TYPE_ERROR,
    MSG_TYPE_MOVE_CMD, MSG_TYPE_STATUS_REQ,
};
use crate::drivers::remote::RemoteCommand;
use crate::state::ControlCoordinator;

use super::telemetry::status_payload;

pub const MAX_REPLIES: usize = 8;

pub type Replies = Vec<ProtocolMessage, MAX_REPLIES>;

/// Incoming side of the remote link: reassembles frames from the radio
/// byte stream and turns each one into shared state updates and replies.
pub struct LinkActivity {
    assembler: FrameAssembler,
}

impl LinkActivity {
    pub fn new() -> Self {
        Self {
            assembler: FrameAssembler::new(),
        }
    }

    /// Feed received bytes; returns the replies to send back, in order.
    pub fn handle(&mut self, bytes: &[u8], coordinator: &ControlCoordinator) -> Replies {
        let mut replies = Replies::new();
        for &b in bytes {
            let Some(frame) = self.assembler.push_byte(b) else {
                continue;
            };
            match frame {
                Ok(msg) => {
                    coordinator.record_frame(msg.seq_num());
                    if let Some(reply) = dispatch(&msg, coordinator) {
                        if replies.push(reply).is_err() {
                            warn!("link: reply queue full, dropping reply");
                        }
                    }
                }
                Err(e) => {
                    warn!("link: dropped frame ({})", e);
                    coordinator.record_dropped_frame();
                }
            }
        }
        replies
    }

    /// Drop a partially received frame, e.g. after a transport error broke
    /// the byte stream. Counted as a dropped frame when anything was pending.
    pub fn discard_partial(&mut self, coordinator: &ControlCoordinator) {
        if self.assembler.pending() > 0 {
            debug!("link: discarding {} buffered bytes", self.assembler.pending());
            self.assembler.clear();
            coordinator.record_dropped_frame();
        }
    }
}

impl Default for LinkActivity {
    fn default() -> Self {
        Self::new()
    }
}

/// Act on one validated message. Replies reuse the request's sequence number.
pub fn dispatch(msg: &ProtocolMessage, coordinator: &ControlCoordinator) -> Option<ProtocolMessage> {
    let seq = msg.seq_num();
    let error = |code: ErrorCode| Some(build_error_message(code as u8, seq));

    match (msg.msg_type(), &msg.payload) {
        (MSG_TYPE_MOVE_CMD, Payload::Move(m)) => {
            let command = RemoteCommand::from_move_payload(m);
            debug!(
                "move: dir={} turn={} speed={} balance={} standup={}",
                command.direction,
                command.turn,
                command.speed,
                command.balance_enabled,
                command.standup_requested
            );
            coordinator.store_command(command);
            None
        }

        (MSG_TYPE_STATUS_REQ, _) => Some(build_status_response(
            status_payload(&coordinator.snapshot()),
            seq,
        )),

        (MSG_TYPE_CONFIG_SET, Payload::Config(cfg)) => {
            let Some(id) = ConfigId::from_u8(cfg.config_id) else {
                return error(ErrorCode::UnknownConfigId);
            };
            if !coordinator.update_tuning(|t| t.set(id, cfg.value)) {
                return error(ErrorCode::BadPayload);
            }
            let (tuning, _) = coordinator.tuning();
            info!("config {} set to {}", cfg.config_id, tuning.get(id));
            Some(build_config_message(MSG_TYPE_CONFIG_SET, cfg.config_id, tuning.get(id), seq))
        }

        (MSG_TYPE_CONFIG_GET, Payload::Config(cfg)) => {
            let Some(id) = ConfigId::from_u8(cfg.config_id) else {
                return error(ErrorCode::UnknownConfigId);
            };
            let (tuning, _) = coordinator.tuning();
            Some(build_config_message(MSG_TYPE_CONFIG_GET, cfg.config_id, tuning.get(id), seq))
        }

        (MSG_TYPE_MOVE_CMD | MSG_TYPE_CONFIG_SET | MSG_TYPE_CONFIG_GET, _) => {
            error(ErrorCode::BadPayload)
        }

        // never answer an error with an error
        (MSG_TYPE_ERROR, _) => None,

        _ => error(ErrorCode::UnknownType),
    }
}
