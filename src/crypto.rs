//! handshake nonce and accept-key computation; masking key generation
//!
//! grounded on the teacher's `protocol::gen_key`/`cal_accept_key`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::Digest;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// generate a fresh 16-byte CSPRNG nonce, base64-encoded, for `Sec-WebSocket-Key`
pub fn generate_handshake_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

/// `Base64(SHA1(key ++ magic GUID))`, used both to build and to verify
/// `Sec-WebSocket-Accept`
pub fn accept_key(websocket_key: &str) -> String {
    let mut hasher = sha1::Sha1::new();
    hasher.update(websocket_key.as_bytes());
    hasher.update(GUID);
    STANDARD.encode(hasher.finalize())
}

/// a fresh, statistically independent masking key for one outbound frame
pub fn generate_mask_key() -> [u8; 4] {
    rand::random()
}
