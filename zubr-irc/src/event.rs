//! Lifecycle events emitted by the transport for the session layer to consume.
//!
//! Events for one attachment are delivered in order over a single channel.

use std::net::SocketAddr;

use crate::isupport::ServerOptionsUpdate;
use crate::reconnect::ConnectionAttempt;

/// Addresses of the raw TCP socket, captured before TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

/// Events that the transport emits to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt is starting.
    Connecting,

    /// TCP is up (before TLS and before any protocol traffic).
    RawSocketConnected(SocketInfo),

    /// Transport-level connect done (TLS complete if enabled), registration
    /// not started yet. `options` carries anything already known from a
    /// previous attachment.
    SocketConnected {
        options: ServerOptionsUpdate,
    },

    /// Handshake complete. `nick` is our confirmed nick.
    Registered {
        nick: String,
        enabled_caps: Vec<String>,
    },

    /// A batch of RPL_ISUPPORT tokens. May arrive several times.
    ServerOptions(ServerOptionsUpdate),

    /// The scheduler decided to retry after `wait`.
    Reconnecting(ConnectionAttempt),

    /// No traffic from the server within the ping timeout.
    PingTimeout,

    /// Closed by policy; no further retry will happen.
    Close,

    /// The socket closed. `error` is set for abnormal closes.
    SocketClose {
        error: Option<String>,
    },

    /// Socket-level error. A `SocketClose` always follows.
    SocketError(String),

    /// The nick we asked for is taken; the transport switched to `fallback`.
    NickInUse {
        attempted: String,
        fallback: String,
    },

    /// Our own nick changed after registration.
    NickChanged {
        old_nick: String,
        new_nick: String,
    },

    /// Transport-internal diagnostics.
    Debug(String),

    /// Raw protocol line (for debugging).
    Raw {
        line: String,
        from_server: bool,
    },
}

impl TransportEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connecting => "connecting",
            TransportEvent::RawSocketConnected(_) => "raw socket connected",
            TransportEvent::SocketConnected { .. } => "socket connected",
            TransportEvent::Registered { .. } => "registered",
            TransportEvent::ServerOptions(_) => "server options",
            TransportEvent::Reconnecting(_) => "reconnecting",
            TransportEvent::PingTimeout => "ping timeout",
            TransportEvent::Close => "close",
            TransportEvent::SocketClose { .. } => "socket close",
            TransportEvent::SocketError(_) => "socket error",
            TransportEvent::NickInUse { .. } => "nick in use",
            TransportEvent::NickChanged { .. } => "nick changed",
            TransportEvent::Debug(_) => "debug",
            TransportEvent::Raw { .. } => "raw",
        }
    }
}
