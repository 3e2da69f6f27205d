/// knobs for the framing layer, independent of handshake/transport setup
///
/// mirrors the teacher's `codec::FrameConfig`, generalized to cover the
/// enrichments in SPEC_FULL.md section 9 (max frame size, utf-8 validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// frames with a decoded payload length above this are a fatal protocol error
    pub max_frame_payload: usize,

    /// validate Text frame payloads (and locally-seen Close reasons) as utf-8
    pub validate_utf8: bool,

    /// cap on a single handshake response header line, to bound memory while
    /// the line-driven parser is fed a potentially hostile peer
    pub read_line_max: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_payload: 1usize << 31,
            validate_utf8: true,
            read_line_max: 8 * 1024,
        }
    }
}
