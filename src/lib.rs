//! client-side WebSocket (RFC 6455) protocol engine
//!
//! this crate owns the handshake and framing logic only; it never opens a
//! socket itself. A host hands it something implementing [`Transport`] and
//! drives it with [`TransportEvent`]s as that transport makes progress.
//!
//! ```ignore
//! use ws_engine::{ConnectionInfoBuilder, Transport, TransportEvent, WebSocket};
//!
//! let info = ConnectionInfoBuilder::new("ws://example.com/chat".parse().unwrap()).build();
//! let mut socket = WebSocket::new(info, my_tcp_transport);
//! socket.on_message(|msg| println!("got {} bytes", msg.payload.len()));
//! socket.start();
//! // as the host's event loop observes readiness:
//! socket.notify(TransportEvent::Connected);
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod errors;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod state_machine;
pub mod transport;

pub use config::WebSocketConfig;
pub use connection::{ConnectionInfo, ConnectionInfoBuilder};
pub use errors::{ProtocolError, WsError};
pub use message::{CloseState, Message};
pub use state_machine::{InternalState, ReadyState, WebSocket};
pub use transport::{Transport, TransportEvent};
