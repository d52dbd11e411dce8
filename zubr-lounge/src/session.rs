//! One user's persistent session.
//!
//! A session owns a runner per configured network, the viewer hub its
//! networks publish to, and the store their config is saved through. It
//! outlives any number of viewer attachments.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::UserConfig;
use crate::config::LoungeConfig;
use crate::error::SessionError;
use crate::ident::IdentRegistry;
use crate::network::{Network, NetworkConfig};
use crate::probe::{CapabilityProbe, ProbeConfig};
use crate::runner::{NetworkCommand, NetworkHandle, NetworkRunner, RunnerContext, SaveHook};
use crate::status::{NetworkStatus, StatusPublisher, status_of};
use crate::store::ConfigStore;
use crate::supervisor::SessionLink;
use crate::viewer::{ViewerEvent, ViewerHub, ViewerId};

/// Everything needed to start a session besides its collaborators.
#[derive(Clone)]
pub struct SessionSettings {
    pub name: String,
    /// Account-service bearer token, if signed in.
    pub token: Option<String>,
    /// Used when the stored config has no away message.
    pub away_message: Option<String>,
    pub lounge: LoungeConfig,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("name", &self.name)
            .field("away_message", &self.away_message)
            .finish_non_exhaustive()
    }
}

/// State shared between the session and its runners.
struct Shared {
    name: String,
    token: Option<String>,
    away_message: RwLock<Option<String>>,
    hub: Arc<ViewerHub>,
    store: Arc<dyn ConfigStore>,
    networks: RwLock<Vec<Arc<Mutex<Network>>>>,
    /// Stored fields the session doesn't interpret, written back as loaded.
    stored: Mutex<UserConfig>,
    dirty: Notify,
}

impl SessionLink for Shared {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn away_message(&self) -> Option<String> {
        self.away_message.read().clone()
    }

    fn viewer_count(&self) -> usize {
        self.hub.count()
    }

    fn viewer_addr(&self) -> Option<SocketAddr> {
        self.hub.last_addr()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

impl SaveHook for Shared {
    fn save(&self) {
        // Coalesced; the saver writes the latest snapshot.
        self.dirty.notify_one();
    }
}

impl Shared {
    fn snapshot(&self) -> UserConfig {
        let mut config = self.stored.lock().clone();
        config.away_message = self.away_message.read().clone();
        config.networks = self
            .networks
            .read()
            .iter()
            .map(|net| net.lock().export())
            .collect();
        config
    }

    async fn flush(&self) {
        let config = self.snapshot();
        match self.store.save(config).await {
            Ok(()) => tracing::debug!(user = %self.name, "User config saved"),
            Err(e) => tracing::error!(user = %self.name, "Failed to save user config: {e}"),
        }
    }
}

async fn save_loop(shared: Arc<Shared>, stop: CancellationToken) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = shared.dirty.notified() => shared.flush().await,
        }
    }
}

pub struct Session {
    shared: Arc<Shared>,
    ctx: RunnerContext,
    networks: Vec<NetworkHandle>,
    saver: JoinHandle<()>,
    stop: CancellationToken,
}

impl Session {
    /// Load the user config and start a runner for every network. A user
    /// with no networks gets the home server.
    pub async fn start(
        settings: SessionSettings,
        hub: Arc<ViewerHub>,
        ident: Arc<IdentRegistry>,
        store: Arc<dyn ConfigStore>,
    ) -> Result<Self, SessionError> {
        let mut stored = store.load().await?;
        let mut configs = std::mem::take(&mut stored.networks);
        let created_home = configs.is_empty() && settings.lounge.home_server.enabled;
        if created_home {
            tracing::info!(user = %settings.name, "No saved networks, adding the home server");
            configs.push(settings.lounge.home_network(&settings.name));
        }
        let away = stored.away_message.take().or(settings.away_message);

        let probe = CapabilityProbe::new(ProbeConfig {
            home_url: settings.lounge.zubr_server.url.clone(),
            ..Default::default()
        })?;

        let shared = Arc::new(Shared {
            name: settings.name,
            token: settings.token,
            away_message: RwLock::new(away),
            hub: Arc::clone(&hub),
            store,
            networks: RwLock::new(Vec::new()),
            stored: Mutex::new(stored),
            dirty: Notify::new(),
        });
        let ctx = RunnerContext {
            supervisor: settings.lounge.supervisor(),
            reconnect: settings.lounge.reconnect.clone(),
            probe,
            publisher: StatusPublisher::new(hub),
            ident,
            session: Arc::clone(&shared) as Arc<dyn SessionLink>,
            saver: Arc::clone(&shared) as Arc<dyn SaveHook>,
        };

        let stop = CancellationToken::new();
        let saver = tokio::spawn(save_loop(Arc::clone(&shared), stop.clone()));
        let mut session = Session {
            shared,
            ctx,
            networks: Vec::new(),
            saver,
            stop,
        };
        for config in configs {
            session.spawn_network(config);
        }
        if created_home {
            session.shared.save();
        }
        tracing::info!(
            user = %session.shared.name,
            networks = session.networks.len(),
            "Session started"
        );
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn hub(&self) -> &Arc<ViewerHub> {
        &self.shared.hub
    }

    fn spawn_network(&mut self, config: NetworkConfig) -> Uuid {
        let handle = NetworkRunner::spawn(Network::from_config(config), self.ctx.clone());
        let uuid = handle.uuid;
        self.shared.networks.write().push(Arc::clone(&handle.network));
        self.networks.push(handle);
        uuid
    }

    fn handle(&self, uuid: Uuid) -> Result<&NetworkHandle, SessionError> {
        self.networks
            .iter()
            .find(|h| h.uuid == uuid)
            .ok_or(SessionError::UnknownNetwork(uuid))
    }

    /// Network ids in configured order.
    pub fn network_ids(&self) -> Vec<Uuid> {
        self.networks.iter().map(|h| h.uuid).collect()
    }

    pub fn status(&self, uuid: Uuid) -> Result<NetworkStatus, SessionError> {
        let handle = self.handle(uuid)?;
        Ok(status_of(&handle.network.lock()))
    }

    pub fn statuses(&self) -> Vec<NetworkStatus> {
        self.networks
            .iter()
            .map(|h| status_of(&h.network.lock()))
            .collect()
    }

    /// Add and start a new network.
    pub fn add_network(&mut self, config: NetworkConfig) -> Uuid {
        let uuid = self.spawn_network(config);
        tracing::info!(user = %self.shared.name, network = %uuid, "Network added");
        self.shared.save();
        uuid
    }

    /// Disconnect and forget a network.
    pub async fn remove_network(&mut self, uuid: Uuid) -> Result<(), SessionError> {
        let idx = self
            .networks
            .iter()
            .position(|h| h.uuid == uuid)
            .ok_or(SessionError::UnknownNetwork(uuid))?;
        let handle = self.networks.remove(idx);
        self.shared
            .networks
            .write()
            .retain(|net| !Arc::ptr_eq(net, &handle.network));
        handle.shutdown().await;
        tracing::info!(user = %self.shared.name, network = %uuid, "Network removed");
        self.shared.save();
        Ok(())
    }

    pub async fn connect(&self, uuid: Uuid) -> Result<(), SessionError> {
        self.handle(uuid)?.send(NetworkCommand::Connect).await
    }

    pub async fn disconnect(&self, uuid: Uuid, message: Option<String>) -> Result<(), SessionError> {
        self.handle(uuid)?
            .send(NetworkCommand::Disconnect { message })
            .await
    }

    /// A line typed by the user. `target` is the channel or query it was
    /// typed into, `None` for the network lobby.
    pub async fn input(
        &self,
        uuid: Uuid,
        text: impl Into<String>,
        target: Option<String>,
    ) -> Result<(), SessionError> {
        self.handle(uuid)?
            .send(NetworkCommand::Input {
                text: text.into(),
                target,
            })
            .await
    }

    /// Set or clear the session-wide away message. Networks with their own
    /// away message keep it.
    pub async fn set_away(&self, message: Option<String>) {
        *self.shared.away_message.write() = message.clone();
        for handle in &self.networks {
            if let Err(e) = handle.send(NetworkCommand::GlobalAway(message.clone())).await {
                tracing::warn!(network = %handle.uuid, "Away not applied: {e}");
            }
        }
        self.shared.save();
    }

    /// Set or clear one network's own away message.
    pub async fn set_network_away(&self, uuid: Uuid, message: Option<String>) -> Result<(), SessionError> {
        self.handle(uuid)?.send(NetworkCommand::SetAway(message)).await
    }

    /// Attach a viewer and bring it up to date with every network.
    pub fn attach_viewer(&self, addr: Option<SocketAddr>) -> (ViewerId, mpsc::Receiver<ViewerEvent>) {
        let (id, rx) = self.shared.hub.attach(addr);
        for handle in &self.networks {
            let net = handle.network.lock();
            self.ctx.publisher.publish_status(&net);
            self.ctx.publisher.publish_options(&net);
        }
        (id, rx)
    }

    pub fn detach_viewer(&self, id: ViewerId) {
        self.shared.hub.detach(id);
    }

    /// Quit every network and write the config one last time.
    pub async fn shutdown(self) {
        tracing::info!(user = %self.shared.name, "Shutting down session");
        for handle in self.networks {
            handle.shutdown().await;
        }
        self.stop.cancel();
        if let Err(e) = self.saver.await {
            tracing::warn!("Saver task failed: {e}");
        }
        self.shared.flush().await;
    }
}
