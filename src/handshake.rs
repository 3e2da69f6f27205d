//! client HTTP Upgrade request/response per RFC 6455 section 4
//!
//! grounded on the teacher's `protocol::perform_handshake`, generalized from
//! "buffer until CRLFCRLF then `httparse::Response::parse`" into a genuinely
//! line-at-a-time resumable parser, matching `spec.md` section 4.3's
//! "line-driven, restartable" requirement and the suspension-point model of
//! section 5. Header validation itself follows
//! `snapview-tungstenite-rs`'s `VerifyData::verify_response`.

use crate::connection::ConnectionInfo;
use crate::crypto::accept_key;
use crate::errors::WsError;

/// builds the client request line-by-line, per spec.md section 4.3 steps 1-7
pub fn build_request(info: &ConnectionInfo, websocket_key: &str) -> String {
    let mut req = format!("GET {} HTTP/1.1\r\n", info.resource_name());

    if info.host_header_needs_port() {
        req.push_str(&format!("Host: {}:{}\r\n", info.host(), info.port()));
    } else {
        req.push_str(&format!("Host: {}\r\n", info.host()));
    }

    req.push_str("Upgrade: websocket\r\n");
    req.push_str("Connection: Upgrade\r\n");
    req.push_str(&format!("Sec-WebSocket-Key: {websocket_key}\r\n"));

    if let Some(origin) = info.origin() {
        req.push_str(&format!("Origin: {origin}\r\n"));
    }
    if !info.protocols().is_empty() {
        req.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", info.protocols().join(", ")));
    }
    if !info.extensions().is_empty() {
        req.push_str(&format!("Sec-WebSocket-Extensions: {}\r\n", info.extensions().join(", ")));
    }
    for (name, value) in info.extra_headers() {
        req.push_str(&format!("{name}: {value}\r\n"));
    }

    req.push_str("Sec-WebSocket-Version: 13\r\n");
    req.push_str("\r\n");
    req
}

#[derive(Debug, PartialEq, Eq)]
pub enum HandshakeProgress {
    NeedMoreLines,
    Complete,
}

#[derive(Debug, PartialEq, Eq)]
enum ParseStage {
    StatusLine,
    Headers,
}

/// fed one response line at a time; succeeds only once every mandatory
/// header in spec.md section 4.3 has been observed
pub struct HandshakeResponseParser {
    stage: ParseStage,
    expected_accept: String,
    expected_extensions: Vec<String>,
    expected_protocols: Vec<String>,
    seen_upgrade: bool,
    seen_connection: bool,
    seen_accept: bool,
}

impl HandshakeResponseParser {
    pub fn new(info: &ConnectionInfo, websocket_key: &str) -> Self {
        Self {
            stage: ParseStage::StatusLine,
            expected_accept: accept_key(websocket_key),
            expected_extensions: info.extensions().to_vec(),
            expected_protocols: info.protocols().to_vec(),
            seen_upgrade: false,
            seen_connection: false,
            seen_accept: false,
        }
    }

    pub fn feed_line(&mut self, line: &str) -> Result<HandshakeProgress, WsError> {
        match self.stage {
            ParseStage::StatusLine => {
                self.parse_status_line(line)?;
                self.stage = ParseStage::Headers;
                Ok(HandshakeProgress::NeedMoreLines)
            }
            ParseStage::Headers => {
                if line.trim().is_empty() {
                    if self.seen_upgrade && self.seen_connection && self.seen_accept {
                        Ok(HandshakeProgress::Complete)
                    } else {
                        Err(WsError::ConnectionUpgradeFailed(
                            "response missing a mandatory upgrade header".to_string(),
                        ))
                    }
                } else {
                    self.parse_header_line(line)?;
                    Ok(HandshakeProgress::NeedMoreLines)
                }
            }
        }
    }

    fn parse_status_line(&self, line: &str) -> Result<(), WsError> {
        let mut parts = line.split_whitespace();
        let version = parts.next().unwrap_or_default();
        let status = parts.next().unwrap_or_default();
        if version != "HTTP/1.1" {
            return Err(WsError::ConnectionUpgradeFailed(format!("unsupported http version {version}")));
        }
        if status != "101" {
            return Err(WsError::ConnectionUpgradeFailed(format!("expected status 101, got {status}")));
        }
        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), WsError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WsError::ConnectionUpgradeFailed(format!("malformed header line {line:?}")))?;
        let name = name.trim();
        let value = value.trim();

        match name.to_ascii_lowercase().as_str() {
            "upgrade" => {
                if !value.eq_ignore_ascii_case("websocket") {
                    return Err(WsError::ConnectionUpgradeFailed(format!("unexpected Upgrade value {value:?}")));
                }
                self.seen_upgrade = true;
            }
            "connection" => {
                if !value.eq_ignore_ascii_case("upgrade") {
                    return Err(WsError::ConnectionUpgradeFailed(format!("unexpected Connection value {value:?}")));
                }
                self.seen_connection = true;
            }
            "sec-websocket-accept" => {
                if value != self.expected_accept {
                    return Err(WsError::ConnectionUpgradeFailed(format!(
                        "accept key mismatch, expected {} got {value}",
                        self.expected_accept
                    )));
                }
                self.seen_accept = true;
            }
            "sec-websocket-extensions" => {
                for token in value.split(',').map(str::trim) {
                    if !self.expected_extensions.iter().any(|e| e.eq_ignore_ascii_case(token)) {
                        return Err(WsError::ConnectionUpgradeFailed(format!("unrequested extension {token:?}")));
                    }
                }
            }
            "sec-websocket-protocol" => {
                for token in value.split(',').map(str::trim) {
                    if !self.expected_protocols.iter().any(|p| p.eq_ignore_ascii_case(token)) {
                        return Err(WsError::ConnectionUpgradeFailed(format!("unrequested subprotocol {token:?}")));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInfoBuilder;

    fn info() -> ConnectionInfo {
        ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build()
    }

    #[test]
    fn request_matches_spec_shape() {
        let req = build_request(&info(), "dGhlIHNhbXBsZSBub25jZQ==");
        assert!(req.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(req.contains("Host: example.com\r\n"));
        assert!(req.contains("Upgrade: websocket\r\n"));
        assert!(req.contains("Connection: Upgrade\r\n"));
        assert!(req.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(req.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn host_header_gets_explicit_port_off_default() {
        let info = ConnectionInfoBuilder::new("ws://example.com:8080/chat".parse().unwrap()).build();
        let req = build_request(&info, "key");
        assert!(req.contains("Host: example.com:8080\r\n"));
    }

    #[test]
    fn accepts_the_rfc_worked_example() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut parser = HandshakeResponseParser::new(&info(), key);
        assert_eq!(parser.feed_line("HTTP/1.1 101 Switching Protocols").unwrap(), HandshakeProgress::NeedMoreLines);
        assert_eq!(parser.feed_line("Upgrade: websocket").unwrap(), HandshakeProgress::NeedMoreLines);
        assert_eq!(parser.feed_line("Connection: Upgrade").unwrap(), HandshakeProgress::NeedMoreLines);
        assert_eq!(
            parser.feed_line("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").unwrap(),
            HandshakeProgress::NeedMoreLines
        );
        assert_eq!(parser.feed_line("").unwrap(), HandshakeProgress::Complete);
    }

    #[test]
    fn rejects_non_101_status() {
        let mut parser = HandshakeResponseParser::new(&info(), "key");
        let err = parser.feed_line("HTTP/1.1 302 Found").unwrap_err();
        assert!(matches!(err, WsError::ConnectionUpgradeFailed(_)));
    }

    #[test]
    fn rejects_mismatched_accept_key() {
        let mut parser = HandshakeResponseParser::new(&info(), "dGhlIHNhbXBsZSBub25jZQ==");
        parser.feed_line("HTTP/1.1 101 Switching Protocols").unwrap();
        parser.feed_line("Upgrade: websocket").unwrap();
        parser.feed_line("Connection: Upgrade").unwrap();
        let err = parser.feed_line("Sec-WebSocket-Accept: wrong").unwrap_err();
        assert!(matches!(err, WsError::ConnectionUpgradeFailed(_)));
    }

    #[test]
    fn rejects_missing_mandatory_header() {
        let mut parser = HandshakeResponseParser::new(&info(), "key");
        parser.feed_line("HTTP/1.1 101 Switching Protocols").unwrap();
        parser.feed_line("Upgrade: websocket").unwrap();
        // Connection header omitted entirely
        let err = parser.feed_line("").unwrap_err();
        assert!(matches!(err, WsError::ConnectionUpgradeFailed(_)));
    }

    #[test]
    fn rejects_unrequested_extension() {
        let mut parser = HandshakeResponseParser::new(&info(), "key");
        parser.feed_line("HTTP/1.1 101 Switching Protocols").unwrap();
        let err = parser.feed_line("Sec-WebSocket-Extensions: permessage-deflate").unwrap_err();
        assert!(matches!(err, WsError::ConnectionUpgradeFailed(_)));
    }
}
