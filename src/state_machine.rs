//! connection lifecycle: states, transitions, and the `WebSocket` engine
//! that ties handshake + framing + transport together
//!
//! generalized from the teacher's `ClientBuilder::connect`/`async_connect`
//! (`lib.rs`), which inline the handshake-then-loop shape for one concrete
//! transport, into the explicit state machine `spec.md` section 4.5 calls
//! for, driven by [`TransportEvent`]s instead of `.await`.

use tracing::{debug, trace, warn};

use crate::codec::{FrameDecoder, PollOutcome};
use crate::connection::ConnectionInfo;
use crate::crypto::{generate_handshake_key, generate_mask_key};
use crate::errors::{ProtocolError, WsError};
use crate::frame::{encode_frame, OpCode};
use crate::handshake::{build_request, HandshakeProgress, HandshakeResponseParser};
use crate::message::{CloseState, Message};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalState {
    NotStarted,
    EstablishingProtocolConnection,
    SendingClientHandshake,
    WaitingForServerHandshake,
    Open,
    Closing,
    Closed,
    Errored,
}

/// host-visible, coarse-grained lifecycle derived from [`InternalState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// close codes that must never appear on the wire (RFC 6455 section 7.4.1/7.4.2):
/// below the defined range, reserved-but-undefined values, or above the private-use range
fn is_reserved_close_code(code: u16) -> bool {
    code < 1000 || (1004..=1006).contains(&code) || (1015..=2999).contains(&code) || code >= 5000
}

impl InternalState {
    pub fn ready_state(self) -> ReadyState {
        match self {
            InternalState::NotStarted
            | InternalState::EstablishingProtocolConnection
            | InternalState::SendingClientHandshake
            | InternalState::WaitingForServerHandshake => ReadyState::Connecting,
            InternalState::Open => ReadyState::Open,
            InternalState::Closing => ReadyState::Closing,
            InternalState::Closed | InternalState::Errored => ReadyState::Closed,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, InternalState::Closed | InternalState::Errored)
    }
}

type OpenCb = Box<dyn FnMut()>;
type MessageCb = Box<dyn FnMut(Message)>;
type ErrorCb = Box<dyn FnMut(WsError)>;
type CloseCb = Box<dyn FnMut(u16, String, bool)>;

/// the protocol engine: one per connection attempt, not reusable after it
/// reaches a terminal state
pub struct WebSocket<T: Transport> {
    info: ConnectionInfo,
    transport: Option<T>,
    state: InternalState,
    websocket_key: String,
    handshake: Option<HandshakeResponseParser>,
    decoder: FrameDecoder,
    close_state: CloseState,

    on_open: Option<OpenCb>,
    on_message: Option<MessageCb>,
    on_error: Option<ErrorCb>,
    on_close: Option<CloseCb>,
}

impl<T: Transport> WebSocket<T> {
    pub fn new(info: ConnectionInfo, transport: T) -> Self {
        Self {
            info,
            transport: Some(transport),
            state: InternalState::NotStarted,
            websocket_key: String::new(),
            handshake: None,
            decoder: FrameDecoder::default(),
            close_state: CloseState::default(),
            on_open: None,
            on_message: None,
            on_error: None,
            on_close: None,
        }
    }

    pub fn on_open(&mut self, cb: impl FnMut() + 'static) {
        self.on_open = Some(Box::new(cb));
    }

    pub fn on_message(&mut self, cb: impl FnMut(Message) + 'static) {
        self.on_message = Some(Box::new(cb));
    }

    pub fn on_error(&mut self, cb: impl FnMut(WsError) + 'static) {
        self.on_error = Some(Box::new(cb));
    }

    pub fn on_close(&mut self, cb: impl FnMut(u16, String, bool) + 'static) {
        self.on_close = Some(Box::new(cb));
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.ready_state()
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// `NotStarted -> EstablishingProtocolConnection`, asks the transport to connect
    pub fn start(&mut self) {
        if self.state != InternalState::NotStarted {
            warn!(?self.state, "start() called more than once, ignoring");
            return;
        }
        self.state = InternalState::EstablishingProtocolConnection;
        if let Some(transport) = self.transport.as_mut() {
            transport.connect();
        }
    }

    /// push one transport event into the engine
    pub fn notify(&mut self, event: TransportEvent) {
        match (self.state, event) {
            (InternalState::EstablishingProtocolConnection, TransportEvent::Connected) => {
                self.begin_handshake();
            }
            (InternalState::WaitingForServerHandshake, TransportEvent::ReadyToRead) => {
                self.drain_handshake();
            }
            (InternalState::Open | InternalState::Closing, TransportEvent::ReadyToRead) => {
                self.drain_frames();
            }
            (state, TransportEvent::ConnectionError(reason)) if !state.is_terminal() => {
                self.fatal_error(WsError::CouldNotEstablishConnection(reason));
            }
            (state, event) => {
                trace!(?state, ?event, "ignoring transport event in this state");
            }
        }
    }

    fn begin_handshake(&mut self) {
        self.state = InternalState::SendingClientHandshake;
        self.websocket_key = generate_handshake_key();
        let request = build_request(&self.info, &self.websocket_key);
        debug!(resource = %self.info.resource_name(), "sending client handshake");
        if let Some(transport) = self.transport.as_mut() {
            transport.send(request.as_bytes());
        }
        self.handshake = Some(HandshakeResponseParser::new(&self.info, &self.websocket_key));
        self.state = InternalState::WaitingForServerHandshake;
    }

    fn drain_handshake(&mut self) {
        loop {
            let Some(transport) = self.transport.as_mut() else { return };
            if !transport.can_read_line() {
                return;
            }
            let Some(line) = transport.read_line(self.info.config().read_line_max) else {
                return;
            };
            let Some(parser) = self.handshake.as_mut() else { return };
            match parser.feed_line(&line) {
                Ok(HandshakeProgress::NeedMoreLines) => continue,
                Ok(HandshakeProgress::Complete) => {
                    debug!("handshake complete, connection open");
                    self.state = InternalState::Open;
                    if let Some(cb) = self.on_open.as_mut() {
                        cb();
                    }
                    // any frame bytes already buffered past the header are
                    // handled on the transport's next readiness notification
                    return;
                }
                Err(err) => {
                    self.fatal_error(err);
                    return;
                }
            }
        }
    }

    fn drain_frames(&mut self) {
        loop {
            let Some(transport) = self.transport.as_mut() else { return };
            if !transport.can_read() {
                return;
            }
            let outcome = {
                let config = self.info.config();
                self.decoder.poll(transport, &config)
            };
            match outcome {
                Ok(PollOutcome::Pending) => return,
                Ok(PollOutcome::CleanEof) => {
                    self.finish_clean_close();
                    return;
                }
                Err(err) => {
                    self.fatal_error(err);
                    return;
                }
                Ok(PollOutcome::Frame(frame)) => {
                    if let Err(err) = self.dispatch_frame(frame) {
                        self.fatal_error(err);
                        return;
                    }
                    if self.state.is_terminal() {
                        return;
                    }
                }
            }
        }
    }

    fn dispatch_frame(&mut self, frame: crate::frame::DecodedFrame) -> Result<(), WsError> {
        let opcode = frame.opcode();
        trace!(opcode_raw = frame.opcode_raw, fin = frame.fin, len = frame.payload.len(), "decoded frame");

        let Some(opcode) = opcode else {
            trace!(opcode_raw = frame.opcode_raw, "unknown opcode, ignoring");
            return Ok(());
        };

        // spec.md section 4.4: continuation frames, and any fin=0 data frame,
        // are unsupported in this engine and must fail the connection cleanly
        if opcode == OpCode::Continuation || (!frame.fin && !opcode.is_control()) {
            return Err(ProtocolError::UnsupportedFragmentation { opcode: frame.opcode_raw, fin: frame.fin }.into());
        }

        // RFC 6455 section 5.4: control frames must never be fragmented
        if opcode.is_control() && !frame.fin {
            return Err(ProtocolError::FragmentedControlFrame { opcode: frame.opcode_raw }.into());
        }

        // RFC 6455 section 5.5: all control frame payloads are capped at 125 bytes
        if opcode.is_control() && frame.payload.len() > 125 {
            return Err(ProtocolError::ControlFrameTooBig(frame.payload.len()).into());
        }

        match opcode {
            OpCode::Close => self.handle_close_frame(frame.payload),
            OpCode::Ping => self.handle_ping_frame(frame.payload),
            OpCode::Pong => Ok(()),
            OpCode::Text => self.deliver_message(frame.payload, true),
            OpCode::Binary => self.deliver_message(frame.payload, false),
            OpCode::Continuation => unreachable!("handled above"),
        }
    }

    fn handle_close_frame(&mut self, payload: Vec<u8>) -> Result<(), WsError> {
        if payload.len() == 1 {
            return Err(ProtocolError::InvalidCloseFramePayload(1).into());
        }
        if payload.len() >= 2 {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if is_reserved_close_code(code) {
                return Err(ProtocolError::InvalidCloseCode(code).into());
            }
            let reason_bytes = &payload[2..];
            let reason = if self.info.config().validate_utf8 {
                std::str::from_utf8(reason_bytes).map_err(|_| ProtocolError::InvalidUtf8)?.to_string()
            } else {
                String::from_utf8_lossy(reason_bytes).to_string()
            };
            self.close_state = CloseState { code, reason };
        }
        debug!(code = self.close_state.code, "received close frame");
        self.state = InternalState::Closing;
        Ok(())
    }

    fn handle_ping_frame(&mut self, payload: Vec<u8>) -> Result<(), WsError> {
        let frame = encode_frame(OpCode::Pong, &payload, true, generate_mask_key());
        if let Some(transport) = self.transport.as_mut() {
            transport.send(&frame);
        }
        Ok(())
    }

    fn deliver_message(&mut self, payload: Vec<u8>, is_text: bool) -> Result<(), WsError> {
        if is_text && self.info.config().validate_utf8 {
            std::str::from_utf8(&payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        }
        if let Some(cb) = self.on_message.as_mut() {
            cb(Message { payload, is_text });
        }
        Ok(())
    }

    fn finish_clean_close(&mut self) {
        self.state = InternalState::Closed;
        let CloseState { code, reason } = self.close_state.clone();
        if let Some(cb) = self.on_close.as_mut() {
            cb(code, reason, true);
        }
        self.discard_connection();
    }

    /// send one unfragmented Text or Binary frame; only valid while `Open`
    pub fn send(&mut self, msg: Message) -> bool {
        if self.state != InternalState::Open {
            self.report_error(WsError::InvalidState(self.state));
            return false;
        }
        let opcode = if msg.is_text { OpCode::Text } else { OpCode::Binary };
        let frame = encode_frame(opcode, &msg.payload, true, generate_mask_key());
        self.transport.as_mut().map(|t| t.send(&frame)).unwrap_or(false)
    }

    /// send a Close frame and move to `Closing`; only valid while `Open`
    pub fn close(&mut self, code: u16, reason: String) {
        if self.state != InternalState::Open {
            self.report_error(WsError::InvalidState(self.state));
            return;
        }
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        let frame = encode_frame(OpCode::Close, &payload, true, generate_mask_key());
        if let Some(transport) = self.transport.as_mut() {
            transport.send(&frame);
        }
        self.state = InternalState::Closing;
    }

    /// report a non-fatal error to the host: the connection is left as-is,
    /// unlike [`Self::fatal_error`]
    fn report_error(&mut self, err: WsError) {
        warn!(error = %err, "invalid operation");
        if let Some(cb) = self.on_error.as_mut() {
            cb(err);
        }
    }

    fn fatal_error(&mut self, err: WsError) {
        warn!(error = %err, "connection failed");
        self.state = InternalState::Errored;
        if let Some(cb) = self.on_error.as_mut() {
            cb(err);
        }
        self.discard_connection();
    }

    /// release the transport; no further callbacks fire after this
    pub fn discard_connection(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.discard_connection();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInfoBuilder;
    use crate::crypto::accept_key;
    use crate::transport::tests::ScriptedTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn handshake_bytes(key: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            accept_key(key)
        )
        .into_bytes()
    }

    fn open_socket() -> (WebSocket<ScriptedTransport>, Rc<RefCell<bool>>) {
        let info = ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build();
        let transport = ScriptedTransport::with_bytes(vec![]);
        let mut ws = WebSocket::new(info, transport);

        let opened = Rc::new(RefCell::new(false));
        let opened2 = opened.clone();
        ws.on_open(move || *opened2.borrow_mut() = true);

        ws.start();
        ws.notify(TransportEvent::Connected);

        let key = ws.websocket_key.clone();
        ws.transport.as_mut().unwrap().push_inbound(&handshake_bytes(&key));
        ws.notify(TransportEvent::ReadyToRead);

        (ws, opened)
    }

    #[test]
    fn happy_path_opens_and_delivers_message() {
        let (mut ws, opened) = open_socket();
        assert!(*opened.borrow());
        assert_eq!(ws.ready_state(), ReadyState::Open);

        let messages = Rc::new(RefCell::new(Vec::new()));
        let messages2 = messages.clone();
        ws.on_message(move |m| messages2.borrow_mut().push(m));

        // server echoes an unmasked Text "Hello" frame
        let mut frame = vec![0x81, 0x05];
        frame.extend_from_slice(b"Hello");
        ws.transport.as_mut().unwrap().push_inbound(&frame);
        ws.notify(TransportEvent::ReadyToRead);

        assert_eq!(messages.borrow().len(), 1);
        assert_eq!(messages.borrow()[0].payload, b"Hello");
        assert!(messages.borrow()[0].is_text);
    }

    #[test]
    fn send_masks_every_frame() {
        let (mut ws, _) = open_socket();
        assert!(ws.send(Message::text("Hello")));
        let sent = &ws.transport.as_ref().unwrap().sent;
        assert_eq!(sent.len(), 1);
        let frame = &sent[0];
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1] & 0x80, 0x80, "client frames must be masked");
        assert_eq!(frame[1] & 0x7F, 5);
    }

    #[test]
    fn server_ping_gets_ponged() {
        let (mut ws, _) = open_socket();
        let mut ping = vec![0x89, 0x04];
        ping.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        ws.transport.as_mut().unwrap().push_inbound(&ping);
        ws.notify(TransportEvent::ReadyToRead);

        let sent = &ws.transport.as_ref().unwrap().sent;
        assert_eq!(sent.len(), 1);
        let pong = &sent[0];
        assert_eq!(pong[0], 0x8A);
        assert_eq!(pong[1] & 0x80, 0x80);
        let mask = [pong[2], pong[3], pong[4], pong[5]];
        let mut payload = pong[6..].to_vec();
        crate::frame::apply_mask(&mut payload, mask);
        assert_eq!(payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn clean_close_round_trip() {
        let (mut ws, _) = open_socket();
        let closed = Rc::new(RefCell::new(None));
        let closed2 = closed.clone();
        ws.on_close(move |code, reason, was_clean| *closed2.borrow_mut() = Some((code, reason, was_clean)));

        ws.close(1000, "bye".to_string());
        assert_eq!(ws.ready_state(), ReadyState::Closing);

        let mut close_frame = vec![0x88, 0x05];
        close_frame.extend_from_slice(&1000u16.to_be_bytes());
        close_frame.extend_from_slice(b"bye");
        {
            let transport = ws.transport.as_mut().unwrap();
            transport.push_inbound(&close_frame);
            transport.set_eof(true);
        }
        ws.notify(TransportEvent::ReadyToRead);
        assert_eq!(ws.ready_state(), ReadyState::Closed);
        assert_eq!(closed.borrow().clone(), Some((1000, "bye".to_string(), true)));
    }

    #[test]
    fn bad_accept_key_is_fatal_before_open() {
        let info = ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build();
        let transport = ScriptedTransport::with_bytes(vec![]);
        let mut ws = WebSocket::new(info, transport);

        let opened = Rc::new(RefCell::new(false));
        let opened2 = opened.clone();
        ws.on_open(move || *opened2.borrow_mut() = true);
        let errored = Rc::new(RefCell::new(false));
        let errored2 = errored.clone();
        ws.on_error(move |_| *errored2.borrow_mut() = true);

        ws.start();
        ws.notify(TransportEvent::Connected);
        let bad = "HTTP/1.1 101 Switching Protocols\r\n\
                   Upgrade: websocket\r\n\
                   Connection: Upgrade\r\n\
                   Sec-WebSocket-Accept: wrong\r\n\
                   \r\n";
        ws.transport.as_mut().unwrap().push_inbound(bad.as_bytes());
        ws.notify(TransportEvent::ReadyToRead);

        assert!(!*opened.borrow());
        assert!(*errored.borrow());
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn truncated_payload_surfaces_server_closed_socket() {
        let (mut ws, _) = open_socket();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors2 = errors.clone();
        ws.on_error(move |e| errors2.borrow_mut().push(e.to_string()));

        let mut frame = vec![0x82, 0x7E];
        frame.extend_from_slice(&1000u16.to_be_bytes());
        frame.extend_from_slice(&vec![0u8; 500]); // advertise 1000 bytes, deliver 500
        {
            let transport = ws.transport.as_mut().unwrap();
            transport.push_inbound(&frame);
            transport.set_eof(true);
        }
        ws.notify(TransportEvent::ReadyToRead);

        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn continuation_frame_is_a_fatal_protocol_error() {
        let (mut ws, _) = open_socket();
        let errored = Rc::new(RefCell::new(false));
        let errored2 = errored.clone();
        ws.on_error(move |_| *errored2.borrow_mut() = true);

        let frame = vec![0x00, 0x00]; // fin=0, opcode=continuation, len=0
        ws.transport.as_mut().unwrap().push_inbound(&frame);
        ws.notify(TransportEvent::ReadyToRead);

        assert!(*errored.borrow());
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn fragmented_ping_is_a_fatal_protocol_error() {
        let (mut ws, _) = open_socket();
        let errored = Rc::new(RefCell::new(false));
        let errored2 = errored.clone();
        ws.on_error(move |_| *errored2.borrow_mut() = true);

        let frame = vec![0x09, 0x00]; // fin=0, opcode=ping, len=0
        ws.transport.as_mut().unwrap().push_inbound(&frame);
        ws.notify(TransportEvent::ReadyToRead);

        assert!(*errored.borrow());
        assert!(ws.transport.as_ref().unwrap().sent.is_empty(), "a fragmented ping must not be ponged");
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn oversized_pong_is_a_fatal_protocol_error() {
        let (mut ws, _) = open_socket();
        let errored = Rc::new(RefCell::new(false));
        let errored2 = errored.clone();
        ws.on_error(move |_| *errored2.borrow_mut() = true);

        let mut frame = vec![0x8A, 126]; // fin=1, opcode=pong, extended 16-bit length
        frame.extend_from_slice(&200u16.to_be_bytes());
        frame.extend_from_slice(&vec![0u8; 200]);
        ws.transport.as_mut().unwrap().push_inbound(&frame);
        ws.notify(TransportEvent::ReadyToRead);

        assert!(*errored.borrow());
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn reserved_close_code_is_a_fatal_protocol_error() {
        let (mut ws, _) = open_socket();
        let errored = Rc::new(RefCell::new(false));
        let errored2 = errored.clone();
        ws.on_error(move |_| *errored2.borrow_mut() = true);

        let mut frame = vec![0x88, 0x02];
        frame.extend_from_slice(&1005u16.to_be_bytes()); // reserved, must never appear on the wire
        ws.transport.as_mut().unwrap().push_inbound(&frame);
        ws.notify(TransportEvent::ReadyToRead);

        assert!(*errored.borrow());
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn send_outside_open_reports_invalid_state_without_killing_the_connection() {
        let info = ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build();
        let transport = ScriptedTransport::with_bytes(vec![]);
        let mut ws = WebSocket::new(info, transport);

        let errors = Rc::new(RefCell::new(0));
        let errors2 = errors.clone();
        ws.on_error(move |e| {
            assert!(matches!(e, WsError::InvalidState(InternalState::NotStarted)));
            *errors2.borrow_mut() += 1;
        });

        assert!(!ws.send(Message::text("too early")));
        assert_eq!(*errors.borrow(), 1);
        assert_eq!(ws.ready_state(), ReadyState::Connecting);
    }

    #[test]
    fn close_after_already_closing_reports_invalid_state() {
        let (mut ws, _) = open_socket();
        ws.close(1000, "bye".to_string());
        assert_eq!(ws.ready_state(), ReadyState::Closing);

        let errors = Rc::new(RefCell::new(0));
        let errors2 = errors.clone();
        ws.on_error(move |e| {
            assert!(matches!(e, WsError::InvalidState(InternalState::Closing)));
            *errors2.borrow_mut() += 1;
        });

        ws.close(1001, "again".to_string());
        assert_eq!(*errors.borrow(), 1);
    }
}
