/// a whole application message delivered to or accepted from the host
///
/// mirrors the teacher's `Message<T>` (`lib.rs`), simplified to the one
/// payload representation the host-facing API needs — owned bytes plus a
/// text/binary flag, since `spec.md` section 3 is explicit that the engine
/// does not validate Text payloads as UTF-8 on the wire (a whole-crate-wide
/// validation toggle lives in [`crate::config::WebSocketConfig`] instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Vec<u8>,
    pub is_text: bool,
}

impl Message {
    pub fn text(payload: impl Into<String>) -> Self {
        Self { payload: payload.into().into_bytes(), is_text: true }
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self { payload: payload.into(), is_text: false }
    }
}

/// the most recent Close frame observed, or its RFC 6455-mandated default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseState {
    pub code: u16,
    pub reason: String,
}

impl Default for CloseState {
    fn default() -> Self {
        // 1005 ("no status received") per spec.md section 9
        Self { code: 1005, reason: String::new() }
    }
}
