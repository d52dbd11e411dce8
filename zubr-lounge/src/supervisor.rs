//! Per-network connection state machine.
//!
//! [`Supervisor::handle`] takes one [`Input`] and the network it governs,
//! mutates the network in place and returns the side effects to perform.
//! It never touches a socket, a timer or an HTTP client itself, which keeps
//! every lifecycle rule testable with synthetic event sequences. The
//! [`runner`](crate::runner) executes the effects.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use zubr_irc::event::{SocketInfo, TransportEvent};
use zubr_irc::isupport::ServerOptionsUpdate;
use zubr_irc::reconnect::ConnectionAttempt;

use crate::ident::{IdentHandle, IdentRegistry, ident_for};
use crate::network::{ChanType, HOME_SERVER_NAME, Msg, MsgKind, Network, ServerType};
use crate::probe::ProbeOutcome;

/// Spacing between scheduled startup actions.
const SCHEDULE_STEP: Duration = Duration::from_millis(1000);

/// What the supervisor needs to know about the owning session.
pub trait SessionLink: Send + Sync {
    /// Session (account) name.
    fn name(&self) -> String;
    /// Session-wide away message.
    fn away_message(&self) -> Option<String>;
    /// Number of attached viewers.
    fn viewer_count(&self) -> usize;
    /// Address of the most recent viewer, for hex-IP idents.
    fn viewer_addr(&self) -> Option<SocketAddr>;
    /// Bearer token for the account service, if signed in.
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    SocketConnecting,
    SocketConnected,
    Registered,
    /// The user asked to disconnect; waiting for the socket to go.
    Closing,
    /// `terminal` means no retry will happen until a manual connect.
    Closed { terminal: bool },
    ReconnectWait { attempt: u32, wait: Duration },
}

#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Ident is the viewer's IP as hex instead of the session name.
    pub use_hex_ip: bool,
    /// Mirror raw protocol lines into the lobby.
    pub debug_raw: bool,
    /// Mirror transport diagnostics into the lobby.
    pub debug_framework: bool,
}

/// A delayed action armed after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledAction {
    /// A configured startup command, as typed by the user.
    Input(String),
    Join { channel: String, key: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PublishStatus,
    EmitOptions,
    EmitNick,
    EmitMsg(Msg),
    /// Start a capability probe, replacing any running one.
    Probe,
    Save,
    SetAway(Option<String>),
    Schedule {
        delay: Duration,
        generation: u64,
        action: ScheduledAction,
    },
    /// Perform a scheduled action now.
    Execute(ScheduledAction),
    CancelScheduled,
    /// Start a new transport attachment.
    ConnectTransport,
    /// Skip the remaining reconnect wait.
    ReconnectNow,
    DisconnectTransport { message: Option<String> },
}

/// Everything the supervisor reacts to.
#[derive(Debug, Clone)]
pub enum Input {
    Transport(TransportEvent),
    ProbeFinished(ProbeOutcome),
    TimerFired {
        generation: u64,
        action: ScheduledAction,
    },
    Connect,
    Disconnect { message: Option<String> },
    /// This network's own away message.
    SetAway(Option<String>),
    /// The session-wide away message changed. Networks with their own
    /// message keep it.
    GlobalAway(Option<String>),
}

pub struct Supervisor {
    state: State,
    /// Bumped at the start of every attachment.
    generation: u64,
    /// A connect arrived while the previous socket was still closing.
    connect_queued: bool,
    ident_handle: IdentHandle,
    config: SupervisorConfig,
    ident: Arc<IdentRegistry>,
    session: Arc<dyn SessionLink>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("ident_handle", &self.ident_handle)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        ident: Arc<IdentRegistry>,
        session: Arc<dyn SessionLink>,
    ) -> Self {
        Self {
            state: State::Idle,
            generation: 0,
            connect_queued: false,
            ident_handle: IdentHandle::NONE,
            config,
            ident,
            session,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ident_handle(&self) -> IdentHandle {
        self.ident_handle
    }

    /// First call after creation.
    pub fn start(&mut self, network: &mut Network) -> Vec<Effect> {
        let msg = network.push_lobby(
            MsgKind::Notice,
            format!("Network created, connecting to {}:{}...", network.host, network.port),
            false,
        );
        tracing::info!(
            network = %network.uuid,
            "Connecting to {}:{} (TLS: {}, nick: {})",
            network.host,
            network.port,
            network.tls,
            network.nick
        );
        if network.user_disconnected {
            self.state = State::Closed { terminal: true };
            return vec![Effect::EmitMsg(msg)];
        }
        self.state = State::SocketConnecting;
        vec![Effect::EmitMsg(msg), Effect::ConnectTransport]
    }

    pub fn handle(&mut self, network: &mut Network, input: Input) -> Vec<Effect> {
        match input {
            Input::Transport(event) => self.on_transport(network, event),
            Input::ProbeFinished(outcome) => self.on_probe(network, outcome),
            Input::TimerFired { generation, action } => self.on_timer(network, generation, action),
            Input::Connect => self.on_connect(network),
            Input::Disconnect { message } => self.on_disconnect(network, message),
            Input::SetAway(message) => {
                network.away_message = message.clone();
                let mut effects = vec![Effect::Save];
                if self.state == State::Registered {
                    effects.push(Effect::SetAway(message));
                }
                effects
            }
            Input::GlobalAway(message) => {
                if self.state == State::Registered && network.away_message.is_none() {
                    vec![Effect::SetAway(message)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn on_transport(&mut self, network: &mut Network, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Connecting => {
                tracing::info!(
                    network = %network.uuid,
                    "Connection attempt to {}:{} starting...",
                    network.host,
                    network.port
                );
                self.generation += 1;
                self.connect_queued = false;
                if self.state != State::Closing {
                    self.state = State::SocketConnecting;
                }
                Vec::new()
            }
            TransportEvent::RawSocketConnected(socket) => {
                self.register_ident(network, socket);
                Vec::new()
            }
            TransportEvent::SocketConnected { options } => self.on_socket_connected(network, options),
            TransportEvent::Registered { nick, enabled_caps } => {
                self.on_registered(network, nick, enabled_caps)
            }
            TransportEvent::ServerOptions(update) => {
                network.server_options.merge(&update);
                vec![Effect::EmitOptions, Effect::PublishStatus]
            }
            TransportEvent::Reconnecting(attempt) => self.on_reconnecting(network, attempt),
            TransportEvent::PingTimeout => {
                let msg = network.push_lobby(MsgKind::Notice, "Ping timeout, disconnecting…", false);
                vec![Effect::EmitMsg(msg)]
            }
            TransportEvent::Close if self.connect_queued => {
                tracing::debug!(network = %network.uuid, "Previous transport closed, starting the queued connect");
                Vec::new()
            }
            TransportEvent::Close => {
                let msg = network.push_lobby(
                    MsgKind::Notice,
                    "Disconnected from the network, and will not reconnect. Use /connect to reconnect again.",
                    false,
                );
                self.state = State::Closed { terminal: true };
                vec![Effect::EmitMsg(msg), Effect::CancelScheduled]
            }
            TransportEvent::SocketClose { error } => self.on_socket_close(network, error),
            TransportEvent::SocketError(err) => {
                tracing::error!(
                    network = %network.uuid,
                    "Socket error on {}:{}: {err}",
                    network.host,
                    network.port
                );
                let msg = network.push_lobby(MsgKind::Error, format!("Socket error: {err}"), false);
                vec![Effect::EmitMsg(msg)]
            }
            TransportEvent::NickInUse { attempted, fallback } => {
                tracing::debug!(network = %network.uuid, "Nick {attempted} in use, trying {fallback}");
                if network.keep_nick.is_none() {
                    network.keep_nick = Some(attempted);
                }
                Vec::new()
            }
            TransportEvent::NickChanged { new_nick, .. } => {
                if network.keep_nick.as_deref() == Some(new_nick.as_str()) {
                    network.keep_nick = None;
                }
                network.nick = new_nick;
                vec![Effect::EmitNick]
            }
            TransportEvent::Debug(message) => {
                if !self.config.debug_framework {
                    return Vec::new();
                }
                tracing::debug!(network = %network.uuid, "{message}");
                let msg = network.push_lobby(MsgKind::Info, message, false);
                vec![Effect::EmitMsg(msg)]
            }
            TransportEvent::Raw { line, from_server } => {
                if !self.config.debug_raw {
                    return Vec::new();
                }
                let msg = network.push_lobby(MsgKind::Raw, line, !from_server);
                vec![Effect::EmitMsg(msg)]
            }
        }
    }

    fn register_ident(&mut self, network: &Network, socket: SocketInfo) {
        // A handle still held here means a close was never reported.
        if !self.ident_handle.is_none() {
            tracing::warn!(network = %network.uuid, "Releasing stale ident registration");
            self.ident.remove_socket(self.ident_handle);
        }
        let identity = ident_for(
            self.config.use_hex_ip,
            &self.session.name(),
            &network.username,
            self.session.viewer_addr(),
        );
        self.ident_handle = self.ident.add_socket(socket, &identity);
    }

    fn on_socket_connected(&mut self, network: &mut Network, options: ServerOptionsUpdate) -> Vec<Effect> {
        network.server_options.reset();
        network.server_options.merge(&options);
        let msg = network.push_lobby(MsgKind::Notice, "Connected to the network.", false);
        network.status.connected = true;
        network.status.secure = network.tls;
        if self.state != State::Closing {
            self.state = State::SocketConnected;
        }
        vec![
            Effect::EmitMsg(msg),
            Effect::EmitOptions,
            Effect::Probe,
            Effect::PublishStatus,
        ]
    }

    fn on_registered(&mut self, network: &mut Network, nick: String, enabled_caps: Vec<String>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state == State::Closing {
            // The user already asked to leave; don't rejoin anything.
            return effects;
        }
        self.state = State::Registered;

        if network.keep_nick.as_deref() == Some(nick.as_str()) {
            network.keep_nick = None;
        }
        if network.nick != nick {
            network.nick = nick;
            effects.push(Effect::EmitNick);
        }

        let candidate = match network.server_options.network {
            Some(ref advertised) => Some(advertised.clone()),
            None if network.name == HOME_SERVER_NAME => {
                tracing::info!(
                    network = %network.uuid,
                    "IRC server did not provide NETWORK option, using hostname: {}",
                    network.host
                );
                Some(network.host.clone())
            }
            None => None,
        };
        if let Some(name) = candidate
            && !name.is_empty()
            && name != network.name
        {
            network.set_name(&name);
            tracing::info!(network = %network.uuid, "Updated network name to \"{name}\" from IRC server");
            effects.push(Effect::Save);
            effects.push(Effect::Probe);
        }

        network.enabled_caps = enabled_caps;
        if !network.enabled_caps.is_empty() {
            let text = format!("Enabled capabilities: {}", network.enabled_caps.join(", "));
            effects.push(Effect::EmitMsg(network.push_lobby(MsgKind::Notice, text, false)));
        }

        // A network's own away message always wins. The session-wide one is
        // only asserted when nobody is watching.
        if let Some(ref away) = network.away_message {
            effects.push(Effect::SetAway(Some(away.clone())));
        } else if let Some(away) = self.session.away_message()
            && self.session.viewer_count() == 0
        {
            effects.push(Effect::SetAway(Some(away)));
        }

        let mut delay = SCHEDULE_STEP;
        for command in &network.commands {
            effects.push(Effect::Schedule {
                delay,
                generation: self.generation,
                action: ScheduledAction::Input(command.clone()),
            });
            delay += SCHEDULE_STEP;
        }
        for chan in network.channels.iter().filter(|c| c.kind == ChanType::Channel) {
            effects.push(Effect::Schedule {
                delay,
                generation: self.generation,
                action: ScheduledAction::Join {
                    channel: chan.name.clone(),
                    key: (!chan.key.is_empty()).then(|| chan.key.clone()),
                },
            });
            delay += SCHEDULE_STEP;
        }

        effects.push(Effect::PublishStatus);
        effects
    }

    fn on_reconnecting(&mut self, network: &mut Network, attempt: ConnectionAttempt) -> Vec<Effect> {
        let secs = (attempt.wait.as_millis() as f64 / 1000.0).round() as u64;
        let msg = network.push_lobby(
            MsgKind::Notice,
            format!(
                "Disconnected from the network. Reconnecting in {secs} seconds… (Attempt {})",
                attempt.attempt
            ),
            false,
        );
        self.state = State::ReconnectWait {
            attempt: attempt.attempt,
            wait: attempt.wait,
        };
        vec![Effect::EmitMsg(msg)]
    }

    fn on_socket_close(&mut self, network: &mut Network, error: Option<String>) -> Vec<Effect> {
        let mut effects = Vec::new();

        let handle = std::mem::take(&mut self.ident_handle);
        self.ident.remove_socket(handle);

        for chan in network.all_channels_mut() {
            chan.mark_parted();
        }

        if let Some(err) = error {
            let msg = network.push_lobby(
                MsgKind::Error,
                format!("Connection closed unexpectedly: {err}"),
                false,
            );
            effects.push(Effect::EmitMsg(msg));
        }

        if let Some(nick) = network.keep_nick.take() {
            // Never got the original nick back; restore it locally.
            network.nick = nick;
            effects.push(Effect::EmitNick);
        }

        network.status.connected = false;
        network.status.secure = false;
        self.state = if self.connect_queued {
            State::SocketConnecting
        } else {
            State::Closed {
                terminal: self.state == State::Closing,
            }
        };
        effects.push(Effect::CancelScheduled);
        effects.push(Effect::PublishStatus);
        effects
    }

    fn on_probe(&mut self, network: &mut Network, outcome: ProbeOutcome) -> Vec<Effect> {
        network.server_type = outcome.server_type;
        match outcome.server_type {
            ServerType::Enhanced => {
                network.instance = outcome.instance;
                if outcome.role.is_some() {
                    network.zubr_role = outcome.role;
                }
            }
            _ => {
                network.instance = Default::default();
                network.zubr_role = None;
            }
        }
        if let Some(role) = network.zubr_role {
            tracing::info!(network = %network.uuid, "Fetched user role for {}: {role:?}", network.name);
        }
        vec![Effect::PublishStatus]
    }

    fn on_timer(&mut self, network: &Network, generation: u64, action: ScheduledAction) -> Vec<Effect> {
        if self.state != State::Registered || generation != self.generation {
            tracing::debug!(network = %network.uuid, "Dropping stale scheduled action {action:?}");
            return Vec::new();
        }
        vec![Effect::Execute(action)]
    }

    fn on_connect(&mut self, network: &mut Network) -> Vec<Effect> {
        match self.state {
            State::Idle | State::Closed { .. } => {
                let was_disconnected = std::mem::replace(&mut network.user_disconnected, false);
                let msg = network.push_lobby(
                    MsgKind::Notice,
                    format!("Connecting to {}:{}...", network.host, network.port),
                    false,
                );
                self.state = State::SocketConnecting;
                let mut effects = vec![Effect::EmitMsg(msg), Effect::ConnectTransport];
                if was_disconnected {
                    effects.push(Effect::Save);
                }
                effects
            }
            State::ReconnectWait { .. } => vec![Effect::ReconnectNow],
            State::Closing => {
                // The runner starts the new attachment once the old one is gone.
                network.user_disconnected = false;
                self.connect_queued = true;
                self.state = State::SocketConnecting;
                let msg = network.push_lobby(
                    MsgKind::Notice,
                    format!("Connecting to {}:{}...", network.host, network.port),
                    false,
                );
                vec![Effect::EmitMsg(msg), Effect::ConnectTransport, Effect::Save]
            }
            _ => {
                tracing::debug!(network = %network.uuid, state = ?self.state, "Connect ignored, already connecting");
                Vec::new()
            }
        }
    }

    fn on_disconnect(&mut self, network: &mut Network, message: Option<String>) -> Vec<Effect> {
        if matches!(self.state, State::Idle | State::Closed { terminal: true } | State::Closing) {
            return Vec::new();
        }
        network.user_disconnected = true;
        self.connect_queued = false;
        if matches!(
            self.state,
            State::SocketConnecting | State::SocketConnected | State::Registered
        ) {
            self.state = State::Closing;
        }
        vec![
            Effect::CancelScheduled,
            Effect::DisconnectTransport { message },
            Effect::Save,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ChanState, ChannelConfig, ChannelUser, InstanceInfo, NetworkConfig, ZubrRole};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeSession {
        away: Mutex<Option<String>>,
        viewers: Mutex<usize>,
    }

    impl SessionLink for FakeSession {
        fn name(&self) -> String {
            "alice".into()
        }
        fn away_message(&self) -> Option<String> {
            self.away.lock().clone()
        }
        fn viewer_count(&self) -> usize {
            *self.viewers.lock()
        }
        fn viewer_addr(&self) -> Option<SocketAddr> {
            Some("192.168.1.10:50000".parse().unwrap())
        }
        fn bearer_token(&self) -> Option<String> {
            None
        }
    }

    fn socket() -> SocketInfo {
        SocketInfo {
            local: "127.0.0.1:41000".parse().unwrap(),
            peer: "10.0.0.1:6697".parse().unwrap(),
        }
    }

    fn network() -> Network {
        Network::from_config(NetworkConfig {
            name: "Libera".into(),
            host: "irc.libera.chat".into(),
            nick: "alice".into(),
            commands: vec!["/msg NickServ IDENTIFY x".into()],
            channels: vec![
                ChannelConfig { name: "#a".into(), key: String::new(), kind: ChanType::Channel },
                ChannelConfig { name: "bob".into(), key: String::new(), kind: ChanType::Query },
                ChannelConfig { name: "#b".into(), key: "sekrit".into(), kind: ChanType::Channel },
            ],
            ..Default::default()
        })
    }

    struct Harness {
        sup: Supervisor,
        net: Network,
        ident: Arc<IdentRegistry>,
        session: Arc<FakeSession>,
    }

    impl Harness {
        fn new(config: SupervisorConfig) -> Self {
            let ident = Arc::new(IdentRegistry::new());
            let session = Arc::new(FakeSession::default());
            let sup = Supervisor::new(config, Arc::clone(&ident), session.clone());
            Self { sup, net: network(), ident, session }
        }

        fn feed(&mut self, event: TransportEvent) -> Vec<Effect> {
            self.sup.handle(&mut self.net, Input::Transport(event))
        }

        fn attach(&mut self) -> Vec<Effect> {
            let mut effects = self.sup.start(&mut self.net);
            effects.extend(self.feed(TransportEvent::Connecting));
            effects.extend(self.feed(TransportEvent::RawSocketConnected(socket())));
            effects.extend(self.feed(TransportEvent::SocketConnected {
                options: ServerOptionsUpdate::default(),
            }));
            effects
        }

        fn register(&mut self) -> Vec<Effect> {
            self.feed(TransportEvent::Registered {
                nick: "alice".into(),
                enabled_caps: vec!["multi-prefix".into(), "server-time".into()],
            })
        }
    }

    fn texts(effects: &[Effect]) -> Vec<(MsgKind, String)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::EmitMsg(m) => Some((m.kind, m.text.clone())),
                _ => None,
            })
            .collect()
    }

    fn schedules(effects: &[Effect]) -> Vec<(u64, ScheduledAction)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Schedule { delay, action, .. } => Some((delay.as_millis() as u64, action.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn creation_posts_notice_and_connects() {
        let mut h = Harness::new(SupervisorConfig::default());
        let effects = h.sup.start(&mut h.net);
        assert_eq!(
            texts(&effects),
            vec![(MsgKind::Notice, "Network created, connecting to irc.libera.chat:6697...".to_string())]
        );
        assert!(effects.contains(&Effect::ConnectTransport));
        assert_eq!(h.sup.state(), State::SocketConnecting);
    }

    #[test]
    fn user_disconnected_networks_stay_closed() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.net.user_disconnected = true;
        let effects = h.sup.start(&mut h.net);
        assert!(!effects.contains(&Effect::ConnectTransport));
        assert_eq!(h.sup.state(), State::Closed { terminal: true });
    }

    #[test]
    fn socket_connected_publishes_and_probes() {
        let mut h = Harness::new(SupervisorConfig::default());
        let effects = h.attach();
        assert!(texts(&effects).contains(&(MsgKind::Notice, "Connected to the network.".to_string())));
        assert!(effects.contains(&Effect::Probe));
        assert!(effects.contains(&Effect::PublishStatus));
        assert!(h.net.status.connected);
        assert!(h.net.status.secure);
        assert_eq!(h.sup.state(), State::SocketConnected);
    }

    #[test]
    fn startup_actions_are_spaced_commands_first() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        let effects = h.register();
        assert_eq!(
            schedules(&effects),
            vec![
                (1000, ScheduledAction::Input("/msg NickServ IDENTIFY x".into())),
                (2000, ScheduledAction::Join { channel: "#a".into(), key: None }),
                (3000, ScheduledAction::Join { channel: "#b".into(), key: Some("sekrit".into()) }),
            ]
        );
        assert_eq!(h.sup.state(), State::Registered);
        assert!(texts(&effects).contains(&(
            MsgKind::Notice,
            "Enabled capabilities: multi-prefix, server-time".to_string()
        )));
    }

    #[test]
    fn timers_from_a_dead_attachment_are_dropped() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        let generation = h.sup.generation();
        let action = ScheduledAction::Join { channel: "#a".into(), key: None };

        let live = h.sup.handle(
            &mut h.net,
            Input::TimerFired { generation, action: action.clone() },
        );
        assert_eq!(live, vec![Effect::Execute(action.clone())]);

        h.feed(TransportEvent::SocketClose { error: None });
        let after_close = h.sup.handle(
            &mut h.net,
            Input::TimerFired { generation, action: action.clone() },
        );
        assert!(after_close.is_empty());

        // Next attachment registers; the old generation is still stale.
        h.feed(TransportEvent::Connecting);
        h.feed(TransportEvent::SocketConnected { options: ServerOptionsUpdate::default() });
        h.register();
        let stale = h.sup.handle(&mut h.net, Input::TimerFired { generation, action });
        assert!(stale.is_empty());
    }

    #[test]
    fn network_away_message_wins() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.net.away_message = Some("on the network".into());
        *h.session.away.lock() = Some("global".into());
        *h.session.viewers.lock() = 3;
        h.attach();
        let effects = h.register();
        let aways: Vec<_> = effects.iter().filter(|e| matches!(e, Effect::SetAway(_))).collect();
        assert_eq!(aways, vec![&Effect::SetAway(Some("on the network".into()))]);
    }

    #[test]
    fn global_away_only_without_viewers() {
        let mut h = Harness::new(SupervisorConfig::default());
        *h.session.away.lock() = Some("global".into());
        *h.session.viewers.lock() = 1;
        h.attach();
        let effects = h.register();
        assert!(!effects.iter().any(|e| matches!(e, Effect::SetAway(_))));

        h.feed(TransportEvent::SocketClose { error: None });
        *h.session.viewers.lock() = 0;
        h.feed(TransportEvent::Connecting);
        h.feed(TransportEvent::SocketConnected { options: ServerOptionsUpdate::default() });
        let effects = h.register();
        assert!(effects.contains(&Effect::SetAway(Some("global".into()))));
    }

    #[test]
    fn advertised_network_name_renames_and_saves() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::ServerOptions(ServerOptionsUpdate {
            network: Some("LiberaChat".into()),
            ..Default::default()
        }));
        let effects = h.register();
        assert_eq!(h.net.name, "LiberaChat");
        assert_eq!(h.net.lobby.name, "LiberaChat");
        assert!(effects.contains(&Effect::Save));
        assert!(effects.contains(&Effect::Probe));
    }

    #[test]
    fn placeholder_name_falls_back_to_host() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.net.set_name(HOME_SERVER_NAME);
        h.net.host = "127.0.0.1".into();
        h.attach();
        let effects = h.register();
        assert_eq!(h.net.name, "127.0.0.1");
        assert!(effects.contains(&Effect::Save));
    }

    #[test]
    fn unchanged_name_does_not_save() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        let effects = h.register();
        assert!(!effects.contains(&Effect::Save));
        assert_eq!(h.net.name, "Libera");
    }

    #[test]
    fn socket_close_parts_everything_and_releases_ident() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        assert_eq!(h.ident.len(), 1);
        for chan in h.net.all_channels_mut() {
            chan.state = ChanState::Joined;
            chan.users.insert("bob".into(), ChannelUser { nick: "bob".into(), modes: vec!['o'] });
        }

        let effects = h.feed(TransportEvent::SocketClose { error: Some("ECONNRESET".into()) });

        assert!(h.ident.is_empty());
        assert!(h.sup.ident_handle().is_none());
        assert!(h.net.lobby.users.is_empty());
        for chan in &h.net.channels {
            assert_eq!(chan.state, ChanState::Parted);
            assert!(chan.users.is_empty());
        }
        assert_eq!(
            texts(&effects),
            vec![(MsgKind::Error, "Connection closed unexpectedly: ECONNRESET".to_string())]
        );
        assert!(effects.contains(&Effect::CancelScheduled));
        assert_eq!(effects.last(), Some(&Effect::PublishStatus));
        assert!(!h.net.status.connected);
        assert_eq!(h.sup.state(), State::Closed { terminal: false });
    }

    #[test]
    fn ident_pairs_with_every_close() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.sup.start(&mut h.net);
        for _ in 0..5 {
            h.feed(TransportEvent::Connecting);
            h.feed(TransportEvent::RawSocketConnected(socket()));
            assert_eq!(h.ident.len(), 1);
            h.feed(TransportEvent::SocketClose { error: None });
            assert!(h.ident.is_empty());
        }
        // A close with nothing held is a no-op.
        h.feed(TransportEvent::SocketClose { error: None });
        assert!(h.ident.is_empty());
    }

    #[test]
    fn hex_ip_ident_uses_viewer_address() {
        let mut h = Harness::new(SupervisorConfig { use_hex_ip: true, ..Default::default() });
        h.attach();
        assert_eq!(h.ident.lookup(41000, 6697).as_deref(), Some("c0a8010a"));
    }

    #[test]
    fn econnreset_then_reconnecting_posts_one_of_each() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        let mut effects = h.feed(TransportEvent::SocketClose { error: Some("ECONNRESET".into()) });
        effects.extend(h.feed(TransportEvent::Reconnecting(ConnectionAttempt {
            wait: Duration::from_millis(2000),
            attempt: 1,
        })));
        assert_eq!(
            texts(&effects),
            vec![
                (MsgKind::Error, "Connection closed unexpectedly: ECONNRESET".to_string()),
                (
                    MsgKind::Notice,
                    "Disconnected from the network. Reconnecting in 2 seconds… (Attempt 1)".to_string()
                ),
            ]
        );
        assert_eq!(
            h.sup.state(),
            State::ReconnectWait { attempt: 1, wait: Duration::from_millis(2000) }
        );
    }

    #[test]
    fn reconnect_countdown_rounds_seconds() {
        let mut h = Harness::new(SupervisorConfig::default());
        let effects = h.feed(TransportEvent::Reconnecting(ConnectionAttempt {
            wait: Duration::from_millis(15_600),
            attempt: 4,
        }));
        assert_eq!(
            texts(&effects)[0].1,
            "Disconnected from the network. Reconnecting in 16 seconds… (Attempt 4)"
        );
    }

    #[test]
    fn pending_nick_is_restored_on_close() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::NickInUse { attempted: "alice".into(), fallback: "alice1".into() });
        h.feed(TransportEvent::Registered { nick: "alice1".into(), enabled_caps: vec![] });
        assert_eq!(h.net.nick, "alice1");
        assert_eq!(h.net.keep_nick.as_deref(), Some("alice"));

        let effects = h.feed(TransportEvent::SocketClose { error: None });
        assert_eq!(h.net.nick, "alice");
        assert!(h.net.keep_nick.is_none());
        assert!(effects.contains(&Effect::EmitNick));
    }

    #[test]
    fn regaining_nick_clears_pending_flag() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::NickInUse { attempted: "alice".into(), fallback: "alice1".into() });
        h.feed(TransportEvent::Registered { nick: "alice1".into(), enabled_caps: vec![] });
        let effects = h.feed(TransportEvent::NickChanged { old_nick: "alice1".into(), new_nick: "alice".into() });
        assert!(effects.contains(&Effect::EmitNick));
        assert!(h.net.keep_nick.is_none());
        let effects = h.feed(TransportEvent::SocketClose { error: None });
        assert!(!effects.contains(&Effect::EmitNick));
    }

    #[test]
    fn server_options_merge_without_forgetting() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::ServerOptions(ServerOptionsUpdate {
            chantypes: Some(vec!['#']),
            network: Some("Net".into()),
            ..Default::default()
        }));
        let effects = h.feed(TransportEvent::ServerOptions(ServerOptionsUpdate::default()));
        assert_eq!(effects, vec![Effect::EmitOptions, Effect::PublishStatus]);
        assert_eq!(h.net.server_options.chantypes, vec!['#']);
        assert_eq!(h.net.server_options.network.as_deref(), Some("Net"));
    }

    #[test]
    fn socket_error_notices_without_transition() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        let effects = h.feed(TransportEvent::SocketError("broken pipe".into()));
        assert_eq!(texts(&effects), vec![(MsgKind::Error, "Socket error: broken pipe".to_string())]);
        assert_eq!(h.sup.state(), State::Registered);
    }

    #[test]
    fn policy_close_is_terminal() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::SocketClose { error: None });
        let effects = h.feed(TransportEvent::Close);
        assert_eq!(
            texts(&effects)[0].1,
            "Disconnected from the network, and will not reconnect. Use /connect to reconnect again."
        );
        assert_eq!(h.sup.state(), State::Closed { terminal: true });

        let effects = h.sup.handle(&mut h.net, Input::Connect);
        assert!(effects.contains(&Effect::ConnectTransport));
        assert_eq!(h.sup.state(), State::SocketConnecting);
    }

    #[test]
    fn manual_disconnect_cancels_and_closes_for_good() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        let effects = h.sup.handle(&mut h.net, Input::Disconnect { message: Some("bye".into()) });
        assert_eq!(
            effects,
            vec![
                Effect::CancelScheduled,
                Effect::DisconnectTransport { message: Some("bye".into()) },
                Effect::Save,
            ]
        );
        assert!(h.net.user_disconnected);
        assert_eq!(h.sup.state(), State::Closing);

        h.feed(TransportEvent::SocketClose { error: None });
        assert_eq!(h.sup.state(), State::Closed { terminal: true });

        let again = h.sup.handle(&mut h.net, Input::Disconnect { message: None });
        assert!(again.is_empty());
    }

    #[test]
    fn connect_during_wait_skips_the_countdown() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.feed(TransportEvent::SocketClose { error: None });
        h.feed(TransportEvent::Reconnecting(ConnectionAttempt { wait: Duration::from_secs(8), attempt: 3 }));
        let effects = h.sup.handle(&mut h.net, Input::Connect);
        assert_eq!(effects, vec![Effect::ReconnectNow]);
    }

    #[test]
    fn debug_taps_follow_config() {
        let mut quiet = Harness::new(SupervisorConfig::default());
        assert!(quiet.feed(TransportEvent::Raw { line: "PING :x".into(), from_server: true }).is_empty());
        assert!(quiet.feed(TransportEvent::Debug("hello".into())).is_empty());

        let mut loud = Harness::new(SupervisorConfig {
            debug_raw: true,
            debug_framework: true,
            ..Default::default()
        });
        let raw = loud.feed(TransportEvent::Raw { line: "NICK alice".into(), from_server: false });
        match &raw[0] {
            Effect::EmitMsg(m) => {
                assert_eq!(m.kind, MsgKind::Raw);
                assert!(m.is_self);
            }
            other => panic!("unexpected effect {other:?}"),
        }
        let dbg = loud.feed(TransportEvent::Debug("hello".into()));
        assert_eq!(texts(&dbg), vec![(MsgKind::Info, "hello".to_string())]);
    }

    #[test]
    fn probe_outcome_updates_classification() {
        let mut h = Harness::new(SupervisorConfig::default());
        let effects = h.sup.handle(
            &mut h.net,
            Input::ProbeFinished(ProbeOutcome {
                server_type: ServerType::Enhanced,
                instance: InstanceInfo { name: Some("Zubr".into()), version: Some("1.2".into()), ..Default::default() },
                role: Some(ZubrRole::Owner),
            }),
        );
        assert_eq!(effects, vec![Effect::PublishStatus]);
        assert_eq!(h.net.server_type, ServerType::Enhanced);
        assert_eq!(h.net.zubr_role, Some(ZubrRole::Owner));

        h.sup.handle(
            &mut h.net,
            Input::ProbeFinished(ProbeOutcome {
                server_type: ServerType::Plain,
                instance: InstanceInfo::default(),
                role: None,
            }),
        );
        assert_eq!(h.net.server_type, ServerType::Plain);
        assert_eq!(h.net.zubr_role, None);
        assert_eq!(h.net.instance, InstanceInfo::default());
    }

    #[test]
    fn set_away_saves_and_sends_only_when_registered() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        let before = h.sup.handle(&mut h.net, Input::SetAway(Some("lunch".into())));
        assert_eq!(before, vec![Effect::Save]);
        assert_eq!(h.net.away_message.as_deref(), Some("lunch"));
        let effects = h.register();
        assert!(effects.contains(&Effect::SetAway(Some("lunch".into()))));
        let cleared = h.sup.handle(&mut h.net, Input::SetAway(None));
        assert_eq!(cleared, vec![Effect::Save, Effect::SetAway(None)]);
    }

    #[test]
    fn global_away_never_replaces_network_away() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        h.sup.handle(&mut h.net, Input::SetAway(Some("per-network".into())));

        let set = h.sup.handle(&mut h.net, Input::GlobalAway(Some("global".into())));
        assert!(set.is_empty());
        let cleared = h.sup.handle(&mut h.net, Input::GlobalAway(None));
        assert!(cleared.is_empty());
        assert_eq!(h.net.away_message.as_deref(), Some("per-network"));

        // Viewers attached: only the network's own message is asserted.
        *h.session.away.lock() = Some("global".into());
        *h.session.viewers.lock() = 2;
        h.feed(TransportEvent::SocketClose { error: None });
        h.feed(TransportEvent::Connecting);
        h.feed(TransportEvent::SocketConnected { options: ServerOptionsUpdate::default() });
        let effects = h.register();
        let aways: Vec<_> = effects.iter().filter(|e| matches!(e, Effect::SetAway(_))).collect();
        assert_eq!(aways, vec![&Effect::SetAway(Some("per-network".into()))]);
    }

    #[test]
    fn global_away_reaches_networks_without_their_own() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        assert!(h.sup.handle(&mut h.net, Input::GlobalAway(Some("global".into()))).is_empty());
        h.register();
        let set = h.sup.handle(&mut h.net, Input::GlobalAway(Some("global".into())));
        assert_eq!(set, vec![Effect::SetAway(Some("global".into()))]);
        let cleared = h.sup.handle(&mut h.net, Input::GlobalAway(None));
        assert_eq!(cleared, vec![Effect::SetAway(None)]);
        assert_eq!(h.net.away_message, None);
    }

    #[test]
    fn connect_while_closing_is_queued() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        h.sup.handle(&mut h.net, Input::Disconnect { message: None });
        assert_eq!(h.sup.state(), State::Closing);

        let effects = h.sup.handle(&mut h.net, Input::Connect);
        assert!(effects.contains(&Effect::ConnectTransport));
        assert!(effects.contains(&Effect::Save));
        assert!(!h.net.user_disconnected);

        // The old transport finishes going away without a terminal close.
        h.feed(TransportEvent::SocketClose { error: None });
        let closed = h.feed(TransportEvent::Close);
        assert!(closed.is_empty());
        assert_eq!(h.sup.state(), State::SocketConnecting);

        h.feed(TransportEvent::Connecting);
        h.feed(TransportEvent::SocketConnected { options: ServerOptionsUpdate::default() });
        h.register();
        assert_eq!(h.sup.state(), State::Registered);
        assert!(!h.net.user_disconnected);
    }

    #[test]
    fn disconnect_again_cancels_the_queued_connect() {
        let mut h = Harness::new(SupervisorConfig::default());
        h.attach();
        h.register();
        h.sup.handle(&mut h.net, Input::Disconnect { message: None });
        h.sup.handle(&mut h.net, Input::Connect);
        h.sup.handle(&mut h.net, Input::Disconnect { message: None });
        assert!(h.net.user_disconnected);

        h.feed(TransportEvent::SocketClose { error: None });
        let closed = h.feed(TransportEvent::Close);
        assert!(!texts(&closed).is_empty());
        assert_eq!(h.sup.state(), State::Closed { terminal: true });
    }
}
