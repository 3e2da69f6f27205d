//! the byte-stream capability the engine is driven through
//!
//! generalized from the teacher's `stream.rs` (`WsStream`/`WsAsyncStream`,
//! two concrete enums over a real socket) into a trait, since spec.md
//! section 1 scopes the actual TCP/TLS transport out of this crate
//! entirely. Events that the teacher's tokio-based code would `.await`
//! (`on_connected`, `on_ready_to_read`, `on_connection_error`) are instead
//! pushed into the engine by the host via [`crate::WebSocket::notify`] —
//! see `DESIGN.md` for why that sidesteps the callback-cycle problem
//! spec.md section 9 calls out.

/// a non-blocking, readiness-driven byte stream
///
/// implementations must never block in any of these calls; `read`/`read_line`
/// are only ever invoked by the engine after the matching `can_read*`
/// predicate returned `true`.
pub trait Transport {
    /// initiate the underlying connection; the host is expected to later
    /// call [`crate::WebSocket::notify`] with [`TransportEvent::Connected`]
    /// or [`TransportEvent::ConnectionError`]
    fn connect(&mut self);

    /// best-effort write of the whole slice; returns whether it was accepted
    fn send(&mut self, bytes: &[u8]) -> bool;

    /// read up to `max` bytes; may return fewer, including zero at EOF
    fn read(&mut self, max: usize) -> Vec<u8>;

    /// read one CRLF-terminated line, without the terminator
    fn read_line(&mut self, max: usize) -> Option<String>;

    fn can_read(&self) -> bool;

    fn can_read_line(&self) -> bool;

    fn eof(&self) -> bool;

    /// detach from the connection without necessarily closing it cleanly
    fn discard_connection(&mut self);

    /// terminate the connection
    fn close(&mut self);
}

/// events the host pushes into the engine as the transport makes progress
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    ReadyToRead,
    ConnectionError(String),
}
