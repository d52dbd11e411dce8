//! Status snapshots and their delivery to viewers.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::network::{Msg, Network, ServerType, ZubrRole};
use crate::viewer::{ViewerEvent, ViewerHub};

/// What viewers see about a network's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub network: Uuid,
    pub connected: bool,
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_type: Option<ServerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zubr_role: Option<ZubrRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_signup_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_source_code: Option<String>,
}

/// Snapshot of the current state. Pure: equal inputs give equal snapshots.
pub fn status_of(network: &Network) -> NetworkStatus {
    NetworkStatus {
        network: network.uuid,
        connected: network.status.connected,
        secure: network.status.secure,
        server_type: network.server_type.known(),
        zubr_role: network.zubr_role,
        instance_name: network.instance.name.clone(),
        instance_version: network.instance.version.clone(),
        instance_signup_mode: network.instance.signup_mode.clone(),
        instance_source_code: network.instance.source_code.clone(),
    }
}

/// Sends network-level updates to every viewer of a session.
#[derive(Clone)]
pub struct StatusPublisher {
    hub: Arc<ViewerHub>,
}

impl StatusPublisher {
    pub fn new(hub: Arc<ViewerHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<ViewerHub> {
        &self.hub
    }

    pub fn publish_status(&self, network: &Network) -> NetworkStatus {
        let status = status_of(network);
        self.hub.emit(ViewerEvent::NetworkStatus(status.clone()));
        status
    }

    pub fn publish_options(&self, network: &Network) {
        self.hub.emit(ViewerEvent::NetworkOptions {
            network: network.uuid,
            server_options: network.server_options.clone(),
        });
    }

    pub fn publish_nick(&self, network: &Network) {
        self.hub.emit(ViewerEvent::Nick {
            network: network.uuid,
            nick: network.nick.clone(),
        });
    }

    pub fn publish_msg(&self, network: &Network, msg: Msg) {
        self.hub.emit(ViewerEvent::Msg {
            network: network.uuid,
            chan: network.lobby.name.clone(),
            msg,
        });
    }
}
