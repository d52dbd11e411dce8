//! Socket → identity registry for the ident (RFC 1413) responder.
//!
//! One registry is created at startup and shared by every session through an
//! `Arc`. Handles are opaque non-zero `u64` IDs into a `DashMap`, so
//! registrations from different networks never contend on a single lock.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use zubr_irc::event::SocketInfo;

/// Opaque registration handle. `IdentHandle::NONE` means "nothing held".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IdentHandle(u64);

impl IdentHandle {
    pub const NONE: IdentHandle = IdentHandle(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct IdentEntry {
    socket: SocketInfo,
    identity: String,
}

pub struct IdentRegistry {
    entries: DashMap<u64, IdentEntry>,
    /// Monotonic handle counter; starts at 1 so 0 is never handed out.
    next_handle: AtomicU64,
}

impl Default for IdentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn add_socket(&self, socket: SocketInfo, identity: &str) -> IdentHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            IdentEntry {
                socket,
                identity: identity.to_string(),
            },
        );
        tracing::debug!(handle = id, local = %socket.local, identity, "ident: registered socket");
        IdentHandle(id)
    }

    /// Safe to call with `NONE` or a handle that was already removed.
    pub fn remove_socket(&self, handle: IdentHandle) {
        if handle.is_none() {
            return;
        }
        if self.entries.remove(&handle.0).is_some() {
            tracing::debug!(handle = handle.0, "ident: released socket");
        }
    }

    /// Answer an ident query: `local_port` is our side of the IRC connection,
    /// `remote_port` the IRC server's.
    pub fn lookup(&self, local_port: u16, remote_port: u16) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.socket.local.port() == local_port && e.socket.peer.port() == remote_port)
            .map(|e| e.identity.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// IPv4 → 8 lowercase hex characters. Anything else maps to `00000000`.
pub fn ip2hex(ip: Option<IpAddr>) -> String {
    match ip {
        Some(IpAddr::V4(v4)) => hex::encode(v4.octets()),
        Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => hex::encode(v4.octets()),
            None => "00000000".to_string(),
        },
        None => "00000000".to_string(),
    }
}

/// Identity string for a new socket.
pub fn ident_for(
    use_hex_ip: bool,
    session_name: &str,
    username: &str,
    viewer_addr: Option<SocketAddr>,
) -> String {
    if use_hex_ip {
        return ip2hex(viewer_addr.map(|a| a.ip()));
    }
    if session_name.is_empty() {
        username.to_string()
    } else {
        session_name.to_string()
    }
}
