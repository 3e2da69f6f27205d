use thiserror::Error;

use crate::state_machine::InternalState;

/// top level error surfaced to the host via `on_error`
#[derive(Debug, Error)]
pub enum WsError {
    /// transport reported `on_connection_error` before the handshake completed
    #[error("could not establish connection: {0}")]
    CouldNotEstablishConnection(String),

    /// non-101 status, malformed HTTP, or a missing/mismatched mandatory header
    #[error("connection upgrade failed: {0}")]
    ConnectionUpgradeFailed(String),

    /// transport returned EOF while a frame was only partially read
    #[error("server closed socket mid-frame")]
    ServerClosedSocket,

    /// reserved for future host-initiated aborts
    #[error("client disconnected")]
    ClientDisconnected,

    /// framing-layer fatal condition (oversized frame, bad utf-8, unsupported continuation)
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolError),

    /// a public method was called while the connection was in a state that
    /// doesn't allow it (e.g. `send` before `Open`)
    #[error("invalid operation in state {0:?}")]
    InvalidState(InternalState),
}

/// errors raised while decoding a frame from the wire
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),

    #[error("unsupported continuation/fragmented frame (opcode {opcode}, fin {fin})")]
    UnsupportedFragmentation { opcode: u8, fin: bool },

    #[error("control frames must not be fragmented (opcode {opcode})")]
    FragmentedControlFrame { opcode: u8 },

    #[error("control frame payload too large: {0} bytes")]
    ControlFrameTooBig(usize),

    #[error("invalid close frame payload length {0}")]
    InvalidCloseFramePayload(usize),

    #[error("invalid close code {0}")]
    InvalidCloseCode(u16),

    #[error("payload of {0} bytes exceeds configured max of {1} bytes")]
    PayloadTooLarge(u64, usize),

    #[error("text payload is not valid utf-8")]
    InvalidUtf8,
}
