//! Attached viewers and the events they receive.
//!
//! A session may have any number of viewers (browser tabs, devices) attached
//! at once, or none at all. Each gets its own bounded channel; a viewer that
//! stops reading is dropped rather than allowed to stall a network.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::network::Msg;
use crate::server_options::ServerOptionsTable;
use crate::status::NetworkStatus;

/// Per-viewer queue depth before events start being dropped.
const VIEWER_QUEUE: usize = 1024;

pub type ViewerId = Uuid;

/// Events pushed to viewers.
///
/// Serialized with `#[serde(tag = "type", content = "data")]` so the viewer
/// can switch on `type` and decode `data` accordingly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ViewerEvent {
    #[serde(rename = "network:status")]
    NetworkStatus(NetworkStatus),
    #[serde(rename = "network:options")]
    NetworkOptions {
        network: Uuid,
        #[serde(rename = "serverOptions")]
        server_options: ServerOptionsTable,
    },
    #[serde(rename = "nick")]
    Nick { network: Uuid, nick: String },
    #[serde(rename = "msg")]
    Msg {
        network: Uuid,
        chan: String,
        msg: Msg,
    },
}

struct Viewer {
    tx: mpsc::Sender<ViewerEvent>,
    addr: Option<SocketAddr>,
}

#[derive(Default)]
pub struct ViewerHub {
    viewers: Mutex<HashMap<ViewerId, Viewer>>,
    /// Address of the most recently attached viewer.
    last_addr: Mutex<Option<SocketAddr>>,
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, addr: Option<SocketAddr>) -> (ViewerId, mpsc::Receiver<ViewerEvent>) {
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE);
        let id = Uuid::new_v4();
        self.viewers.lock().insert(id, Viewer { tx, addr });
        if addr.is_some() {
            *self.last_addr.lock() = addr;
        }
        tracing::debug!(viewer = %id, "Viewer attached");
        (id, rx)
    }

    pub fn detach(&self, id: ViewerId) {
        if self.viewers.lock().remove(&id).is_some() {
            tracing::debug!(viewer = %id, "Viewer detached");
        }
    }

    pub fn count(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn last_addr(&self) -> Option<SocketAddr> {
        *self.last_addr.lock()
    }

    pub fn addr_of(&self, id: ViewerId) -> Option<SocketAddr> {
        self.viewers.lock().get(&id).and_then(|v| v.addr)
    }

    /// Deliver to every attached viewer.
    pub fn emit(&self, event: ViewerEvent) {
        let mut viewers = self.viewers.lock();
        viewers.retain(|id, viewer| match viewer.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(viewer = %id, "Viewer queue full, dropping viewer");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// What to do with a viewer that reconnects to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Authenticate with the stored username and token.
    StoredCredentials,
    /// Start a fresh guest session.
    Guest,
    /// Ask the user to sign in.
    SignIn,
}

/// Inputs to [`resume_decision`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeContext<'a> {
    pub stored_user: Option<&'a str>,
    pub has_token: bool,
    /// The instance allows public signup (guest sessions).
    pub public_instance: bool,
    /// The account service explicitly rejected the stored credentials.
    pub rejected: bool,
}

/// Generated guest accounts carry this prefix.
pub const GUEST_PREFIX: &str = "web-user-";

pub fn is_guest_username(user: &str) -> bool {
    user.starts_with(GUEST_PREFIX)
}

/// Stored credentials are always tried first, whatever the username looks
/// like or however many networks the session has. After an explicit
/// rejection, guests on public instances get a new guest session and
/// everyone else is sent to sign-in.
pub fn resume_decision(ctx: ResumeContext<'_>) -> ResumeDecision {
    let guest = ctx.stored_user.is_some_and(is_guest_username);
    if ctx.rejected {
        return if ctx.public_instance && guest {
            ResumeDecision::Guest
        } else {
            ResumeDecision::SignIn
        };
    }
    if ctx.has_token && ctx.stored_user.is_some() {
        return ResumeDecision::StoredCredentials;
    }
    if ctx.public_instance {
        ResumeDecision::Guest
    } else {
        ResumeDecision::SignIn
    }
}
