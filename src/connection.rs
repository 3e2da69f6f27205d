use crate::config::WebSocketConfig;

/// immutable handshake parameters for one connection attempt
///
/// built once via [`ConnectionInfoBuilder`] and owned by the
/// [`crate::WebSocket`] for its whole lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    uri: http::Uri,
    origin: Option<String>,
    protocols: Vec<String>,
    extensions: Vec<String>,
    extra_headers: Vec<(String, String)>,
    config: WebSocketConfig,
}

impl ConnectionInfo {
    /// `scheme://host[:port]` plus the path+query, i.e. everything but scheme/host/port
    pub fn resource_name(&self) -> String {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn uri(&self) -> &http::Uri {
        &self.uri
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.uri.scheme_str(), Some("wss") | Some("https"))
    }

    pub fn default_port(&self) -> u16 {
        if self.is_secure() {
            443
        } else {
            80
        }
    }

    pub fn port(&self) -> u16 {
        self.uri.port_u16().unwrap_or_else(|| self.default_port())
    }

    /// whether `Host:` needs an explicit `:port` suffix
    pub fn host_header_needs_port(&self) -> bool {
        self.port() != self.default_port()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn config(&self) -> WebSocketConfig {
        self.config
    }
}

/// accumulates `ConnectionInfo` fields, mirroring the teacher's `ClientBuilder`
#[derive(Debug, Clone)]
pub struct ConnectionInfoBuilder {
    uri: http::Uri,
    origin: Option<String>,
    protocols: Vec<String>,
    extensions: Vec<String>,
    extra_headers: Vec<(String, String)>,
    config: WebSocketConfig,
}

impl ConnectionInfoBuilder {
    pub fn new(uri: http::Uri) -> Self {
        Self {
            uri,
            origin: None,
            protocols: vec![],
            extensions: vec![],
            extra_headers: vec![],
            config: WebSocketConfig::default(),
        }
    }

    pub fn origin(mut self, origin: impl ToString) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn protocol(mut self, protocol: impl ToString) -> Self {
        self.protocols.push(protocol.to_string());
        self
    }

    pub fn protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn extension(mut self, extension: impl ToString) -> Self {
        self.extensions.push(extension.to_string());
        self
    }

    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn header(mut self, name: impl ToString, value: impl ToString) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ConnectionInfo {
        ConnectionInfo {
            uri: self.uri,
            origin: self.origin,
            protocols: self.protocols,
            extensions: self.extensions,
            extra_headers: self.extra_headers,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_and_resource_name() {
        let info = ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build();
        assert!(!info.is_secure());
        assert_eq!(info.default_port(), 80);
        assert_eq!(info.port(), 80);
        assert!(!info.host_header_needs_port());
        assert_eq!(info.resource_name(), "/chat");
    }

    #[test]
    fn secure_scheme_and_explicit_port() {
        let info = ConnectionInfoBuilder::new("wss://example.com:9001/chat?x=1".parse().unwrap()).build();
        assert!(info.is_secure());
        assert_eq!(info.default_port(), 443);
        assert_eq!(info.port(), 9001);
        assert!(info.host_header_needs_port());
        assert_eq!(info.resource_name(), "/chat?x=1");
    }

    #[test]
    fn resource_name_defaults_to_root() {
        let info = ConnectionInfoBuilder::new("ws://example.com".parse().unwrap()).build();
        assert_eq!(info.resource_name(), "/");
    }
}
