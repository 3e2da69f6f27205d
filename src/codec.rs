//! incremental frame decoder driven by [`crate::transport::Transport`]'s pull
//! model (`can_read()` / `read(n)`), restartable at every suspension point
//!
//! grounded on the teacher's `codec::FrameDecoder::decode_single`
//! (`codec.rs`), which grows a `BytesMut` across `Decoder::decode` calls
//! until a full frame is available. We keep that "accumulate until enough
//! bytes are present, else ask again later" shape but adapt it from a
//! `bytes::Decoder` (pushed buffer) to pulling directly from `Transport`,
//! since `spec.md` section 4.2 puts the transport behind a trait rather than
//! a byte-stream `Read` impl.

use crate::config::WebSocketConfig;
use crate::errors::{ProtocolError, WsError};
use crate::frame::{apply_mask, DecodedFrame};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy)]
enum Stage {
    Header,
    ExtLen16,
    ExtLen64,
    MaskKey,
    Payload,
}

enum Fill {
    Ready,
    Pending,
    CleanEof,
    /// transport hit EOF after a `can_read() == true` promise, but not at a
    /// frame boundary: the peer vanished mid-frame (spec.md section 4.4 step 5)
    Severed,
}

/// result of one [`FrameDecoder::poll`] call
#[derive(Debug)]
pub enum PollOutcome {
    /// not enough bytes were available yet; call again once `on_ready_to_read` fires
    Pending,
    /// a full frame was decoded
    Frame(DecodedFrame),
    /// the transport hit EOF exactly at a frame boundary (spec.md section 4.4 step 1)
    CleanEof,
}

/// incremental state for decoding one frame at a time off a [`Transport`]
pub struct FrameDecoder {
    stage: Stage,
    scratch: Vec<u8>,
    fin: bool,
    opcode_raw: u8,
    masked: bool,
    payload_len: u64,
    mask_key: [u8; 4],
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            stage: Stage::Header,
            scratch: Vec::new(),
            fin: false,
            opcode_raw: 0,
            masked: false,
            payload_len: 0,
            mask_key: [0; 4],
        }
    }
}

impl FrameDecoder {
    fn fill(&mut self, transport: &mut dyn Transport, target: usize) -> Fill {
        while self.scratch.len() < target {
            if !transport.can_read() {
                return Fill::Pending;
            }
            let need = target - self.scratch.len();
            let chunk = transport.read(need);
            if chunk.is_empty() {
                return if matches!(self.stage, Stage::Header) && self.scratch.is_empty() {
                    Fill::CleanEof
                } else {
                    Fill::Severed
                };
            }
            self.scratch.extend_from_slice(&chunk);
        }
        Fill::Ready
    }

    /// advance as far as currently-available transport bytes allow
    pub fn poll(&mut self, transport: &mut dyn Transport, config: &WebSocketConfig) -> Result<PollOutcome, WsError> {
        loop {
            match self.stage {
                Stage::Header => match self.fill(transport, 2) {
                    Fill::CleanEof => return Ok(PollOutcome::CleanEof),
                    Fill::Severed => return Err(WsError::ServerClosedSocket),
                    Fill::Pending => return Ok(PollOutcome::Pending),
                    Fill::Ready => {
                        let b0 = self.scratch[0];
                        let b1 = self.scratch[1];
                        self.fin = b0 & 0x80 != 0;
                        self.opcode_raw = b0 & 0x0F;
                        self.masked = b1 & 0x80 != 0;
                        let len7 = b1 & 0x7F;
                        self.scratch.clear();
                        self.stage = match len7 {
                            0..=125 => {
                                self.payload_len = len7 as u64;
                                self.next_stage_after_length(config)?
                            }
                            126 => Stage::ExtLen16,
                            127 => Stage::ExtLen64,
                            _ => unreachable!("7-bit field"),
                        };
                    }
                },
                Stage::ExtLen16 => match self.fill(transport, 2) {
                    Fill::CleanEof => return Err(WsError::ServerClosedSocket),
                    Fill::Severed => return Err(WsError::ServerClosedSocket),
                    Fill::Pending => return Ok(PollOutcome::Pending),
                    Fill::Ready => {
                        self.payload_len = u16::from_be_bytes([self.scratch[0], self.scratch[1]]) as u64;
                        self.scratch.clear();
                        self.stage = self.next_stage_after_length(config)?;
                    }
                },
                Stage::ExtLen64 => match self.fill(transport, 8) {
                    Fill::CleanEof => return Err(WsError::ServerClosedSocket),
                    Fill::Severed => return Err(WsError::ServerClosedSocket),
                    Fill::Pending => return Ok(PollOutcome::Pending),
                    Fill::Ready => {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&self.scratch[..8]);
                        self.payload_len = u64::from_be_bytes(arr);
                        self.scratch.clear();
                        self.stage = self.next_stage_after_length(config)?;
                    }
                },
                Stage::MaskKey => match self.fill(transport, 4) {
                    Fill::CleanEof => return Err(WsError::ServerClosedSocket),
                    Fill::Severed => return Err(WsError::ServerClosedSocket),
                    Fill::Pending => return Ok(PollOutcome::Pending),
                    Fill::Ready => {
                        self.mask_key.copy_from_slice(&self.scratch[..4]);
                        self.scratch.clear();
                        self.stage = Stage::Payload;
                    }
                },
                Stage::Payload => {
                    // payload_len was already bounds-checked in next_stage_after_length
                    let target = self.payload_len as usize;
                    match self.fill(transport, target) {
                        Fill::CleanEof => return Err(WsError::ServerClosedSocket),
                        Fill::Severed => return Err(WsError::ServerClosedSocket),
                        Fill::Pending => return Ok(PollOutcome::Pending),
                        Fill::Ready => {
                            let mut payload = std::mem::take(&mut self.scratch);
                            if self.masked {
                                apply_mask(&mut payload, self.mask_key);
                            }
                            let frame = DecodedFrame {
                                fin: self.fin,
                                opcode_raw: self.opcode_raw,
                                masked: self.masked,
                                payload,
                            };
                            self.stage = Stage::Header;
                            return Ok(PollOutcome::Frame(frame));
                        }
                    }
                }
            }
        }
    }

    fn next_stage_after_length(&self, config: &WebSocketConfig) -> Result<Stage, WsError> {
        if self.payload_len as u128 > config.max_frame_payload as u128 {
            return Err(ProtocolError::PayloadTooLarge(self.payload_len, config.max_frame_payload).into());
        }
        Ok(if self.masked { Stage::MaskKey } else { Stage::Payload })
    }
}
