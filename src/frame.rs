//! RFC 6455 section 5.2 frame format: opcode values, masking, header encoding
//!
//! grounded on the teacher's `frame.rs` (`OpCode`, `parse_opcode`, `Header`),
//! generalized from the teacher's `BytesMut`-header-in-place mutation into a
//! plain encode/decode pair that matches the pull-based `Transport::read(n)`
//! model instead of a `bytes::Buf` push model.

use bytes::{BufMut, BytesMut};

/// frame type, RFC 6455 section 11.8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0,
            OpCode::Text => 1,
            OpCode::Binary => 2,
            OpCode::Close => 8,
            OpCode::Ping => 9,
            OpCode::Pong => 10,
        }
    }

    /// `None` covers both the reserved ranges and any value above 4 bits;
    /// the decoder treats `None` as "unknown opcode, ignore" per spec.md section 4.4
    pub fn from_u8(val: u8) -> Option<OpCode> {
        match val {
            0 => Some(OpCode::Continuation),
            1 => Some(OpCode::Text),
            2 => Some(OpCode::Binary),
            8 => Some(OpCode::Close),
            9 => Some(OpCode::Ping),
            10 => Some(OpCode::Pong),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// XOR `data` in place with `key`, cycling the 4-byte key
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// a decoded inbound frame, before opcode-specific dispatch
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub fin: bool,
    pub opcode_raw: u8,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl DecodedFrame {
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.opcode_raw)
    }
}

/// encode one complete, always-masked (per spec.md section 4.4) client->server frame
pub fn encode_frame(opcode: OpCode, payload: &[u8], fin: bool, mask_key: [u8; 4]) -> BytesMut {
    let mut out = BytesMut::with_capacity(payload.len() + 14);

    let first_byte = (if fin { 0x80 } else { 0x00 }) | opcode.as_u8();
    out.put_u8(first_byte);

    let len = payload.len();
    if len <= 125 {
        out.put_u8(0x80 | len as u8);
    } else if len <= 65535 {
        out.put_u8(0x80 | 126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(0x80 | 127);
        out.put_u64(len as u64);
    }

    out.put_slice(&mask_key);

    let mut masked_payload = payload.to_vec();
    apply_mask(&mut masked_payload, mask_key);
    out.put_slice(&masked_payload);

    out
}
