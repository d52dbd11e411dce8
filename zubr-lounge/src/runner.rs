//! Async driver for one network.
//!
//! A runner owns the network's transport attachment and its supervisor. It
//! selects over transport events, probe results, timer firings and user
//! commands, feeds each one through [`Supervisor::handle`] and carries out
//! the returned effects. At most one transport task is alive per runner: a
//! new one is only started after the previous task's event stream has ended.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zubr_irc::client::{self, ClientHandle, Command};
use zubr_irc::event::TransportEvent;
use zubr_irc::reconnect::ReconnectConfig;

use crate::error::SessionError;
use crate::ident::IdentRegistry;
use crate::input::{InputAction, parse_input};
use crate::network::{MsgKind, Network};
use crate::probe::{CapabilityProbe, ProbeOutcome};
use crate::status::StatusPublisher;
use crate::supervisor::{Effect, Input, ScheduledAction, SessionLink, Supervisor, SupervisorConfig};

/// Persists the owning session's config when a persisted field changes.
pub trait SaveHook: Send + Sync {
    fn save(&self);
}

/// Commands a session sends to one of its networks.
#[derive(Debug)]
pub enum NetworkCommand {
    Connect,
    Disconnect { message: Option<String> },
    /// This network's own away message.
    SetAway(Option<String>),
    /// The session-wide away message changed.
    GlobalAway(Option<String>),
    /// A line typed by the user into `target` (`None` for the lobby).
    Input { text: String, target: Option<String> },
    /// Quit the transport and stop the runner.
    Shutdown,
}

/// Shared collaborators for every runner of a session.
#[derive(Clone)]
pub struct RunnerContext {
    pub supervisor: SupervisorConfig,
    pub reconnect: ReconnectConfig,
    pub probe: CapabilityProbe,
    pub publisher: StatusPublisher,
    pub ident: Arc<IdentRegistry>,
    pub session: Arc<dyn SessionLink>,
    pub saver: Arc<dyn SaveHook>,
}

/// Results that come back from tasks the runner spawned.
#[derive(Debug)]
enum Internal {
    Timer {
        generation: u64,
        action: ScheduledAction,
    },
    Probe {
        id: u64,
        outcome: ProbeOutcome,
    },
}

struct Attachment {
    handle: ClientHandle,
    events: mpsc::Receiver<TransportEvent>,
}

/// Session-side handle to a running network.
pub struct NetworkHandle {
    pub uuid: Uuid,
    pub network: Arc<Mutex<Network>>,
    cmd_tx: mpsc::Sender<NetworkCommand>,
    task: JoinHandle<()>,
}

impl NetworkHandle {
    pub async fn send(&self, cmd: NetworkCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::RunnerGone(self.uuid))
    }

    /// Stop the runner and wait for its transport to be torn down.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(NetworkCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(network = %self.uuid, "Runner task failed: {e}");
        }
    }
}

pub struct NetworkRunner {
    network: Arc<Mutex<Network>>,
    supervisor: Supervisor,
    ctx: RunnerContext,
    transport: Option<Attachment>,
    /// Start a transport as soon as the current one has gone away.
    pending_connect: bool,
    /// Cancelled whenever scheduled actions must not fire.
    scheduled: CancellationToken,
    probe_cancel: CancellationToken,
    probe_id: u64,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    cmd_rx: mpsc::Receiver<NetworkCommand>,
}

impl NetworkRunner {
    /// Spawn a runner task for `network`.
    pub fn spawn(network: Network, ctx: RunnerContext) -> NetworkHandle {
        let uuid = network.uuid;
        let network = Arc::new(Mutex::new(network));
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (internal_tx, internal_rx) = mpsc::channel(64);
        let supervisor = Supervisor::new(
            ctx.supervisor.clone(),
            Arc::clone(&ctx.ident),
            Arc::clone(&ctx.session),
        );
        let runner = NetworkRunner {
            network: Arc::clone(&network),
            supervisor,
            ctx,
            transport: None,
            pending_connect: false,
            scheduled: CancellationToken::new(),
            probe_cancel: CancellationToken::new(),
            probe_id: 0,
            internal_tx,
            internal_rx,
            cmd_rx,
        };
        let task = tokio::spawn(runner.run());
        NetworkHandle {
            uuid,
            network,
            cmd_tx,
            task,
        }
    }

    async fn run(mut self) {
        let effects = {
            let mut net = self.network.lock();
            self.supervisor.start(&mut net)
        };
        for input in self.execute(effects).await {
            self.apply(input).await;
        }

        loop {
            tokio::select! {
                event = next_event(&mut self.transport) => match event {
                    Some(event) => {
                        if matches!(event, TransportEvent::Connecting) {
                            self.pending_connect = false;
                        }
                        self.apply(Input::Transport(event)).await;
                    }
                    None => self.transport_finished(),
                },
                Some(internal) = self.internal_rx.recv() => match internal {
                    Internal::Timer { generation, action } => {
                        self.apply(Input::TimerFired { generation, action }).await;
                    }
                    Internal::Probe { id, outcome } if id == self.probe_id => {
                        self.apply(Input::ProbeFinished(outcome)).await;
                    }
                    Internal::Probe { .. } => {}
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(NetworkCommand::Shutdown) => break,
                    Some(cmd) => self.on_command(cmd).await,
                },
            }
        }

        self.teardown().await;
    }

    async fn apply(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            let effects = {
                let mut net = self.network.lock();
                self.supervisor.handle(&mut net, input)
            };
            queue.extend(self.execute(effects).await);
        }
    }

    async fn on_command(&mut self, cmd: NetworkCommand) {
        match cmd {
            NetworkCommand::Connect => self.apply(Input::Connect).await,
            NetworkCommand::Disconnect { message } => self.apply(Input::Disconnect { message }).await,
            NetworkCommand::SetAway(message) => self.apply(Input::SetAway(message)).await,
            NetworkCommand::GlobalAway(message) => self.apply(Input::GlobalAway(message)).await,
            NetworkCommand::Input { text, target } => {
                if let Some(input) = self.run_input(&text, target.as_deref()).await {
                    self.apply(input).await;
                }
            }
            NetworkCommand::Shutdown => {}
        }
    }

    /// Carry out a typed line. Session-level commands come back as supervisor
    /// input instead of being sent.
    async fn run_input(&mut self, text: &str, target: Option<&str>) -> Option<Input> {
        match parse_input(text, target) {
            InputAction::Send(cmd) => {
                self.send(cmd).await;
                None
            }
            InputAction::Connect => Some(Input::Connect),
            InputAction::Disconnect(message) => Some(Input::Disconnect { message }),
            InputAction::Away(message) => Some(Input::SetAway(message)),
            InputAction::Rejected(reason) => {
                let mut net = self.network.lock();
                let msg = net.push_lobby(MsgKind::Error, reason, false);
                self.ctx.publisher.publish_msg(&net, msg);
                None
            }
        }
    }

    /// Perform effects in order, returning any follow-up input.
    async fn execute(&mut self, effects: Vec<Effect>) -> Vec<Input> {
        let mut followups = Vec::new();
        for effect in effects {
            match effect {
                Effect::PublishStatus => {
                    self.ctx.publisher.publish_status(&self.network.lock());
                }
                Effect::EmitOptions => {
                    self.ctx.publisher.publish_options(&self.network.lock());
                }
                Effect::EmitNick => {
                    self.ctx.publisher.publish_nick(&self.network.lock());
                }
                Effect::EmitMsg(msg) => {
                    self.ctx.publisher.publish_msg(&self.network.lock(), msg);
                }
                Effect::Probe => self.start_probe(),
                Effect::Save => self.ctx.saver.save(),
                Effect::SetAway(message) => self.send(Command::Away(message)).await,
                Effect::Schedule {
                    delay,
                    generation,
                    action,
                } => {
                    let token = self.scheduled.clone();
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {
                                let _ = tx.send(Internal::Timer { generation, action }).await;
                            }
                        }
                    });
                }
                Effect::Execute(ScheduledAction::Input(text)) => {
                    followups.extend(self.run_input(&text, None).await);
                }
                Effect::Execute(ScheduledAction::Join { channel, key }) => {
                    self.send(Command::Join { channel, key }).await;
                }
                Effect::CancelScheduled => {
                    self.scheduled.cancel();
                    self.scheduled = CancellationToken::new();
                }
                Effect::ConnectTransport => self.connect_transport().await,
                Effect::ReconnectNow => {
                    if let Some(ref t) = self.transport {
                        let _ = t.handle.reconnect().await;
                    }
                }
                Effect::DisconnectTransport { message } => {
                    self.pending_connect = false;
                    self.probe_cancel.cancel();
                    if let Some(ref t) = self.transport {
                        let _ = t.handle.quit(message.as_deref()).await;
                    }
                }
            }
        }
        followups
    }

    async fn send(&self, cmd: Command) {
        let Some(ref t) = self.transport else {
            tracing::debug!("Not connected, dropping {cmd:?}");
            return;
        };
        if let Err(e) = t.handle.send(cmd).await {
            tracing::debug!("Transport gone, command dropped: {e}");
        }
    }

    async fn connect_transport(&mut self) {
        if let Some(ref t) = self.transport {
            // Wait for the old attachment to finish tearing down. If it is
            // only waiting to retry, cut the wait short instead.
            self.pending_connect = true;
            let _ = t.handle.reconnect().await;
            return;
        }
        let config = self.network.lock().connect_config(self.ctx.supervisor.debug_raw);
        let (handle, events) = client::connect(config, self.ctx.reconnect.clone());
        self.transport = Some(Attachment { handle, events });
    }

    fn transport_finished(&mut self) {
        self.transport = None;
        if std::mem::take(&mut self.pending_connect) {
            let config = self.network.lock().connect_config(self.ctx.supervisor.debug_raw);
            let (handle, events) = client::connect(config, self.ctx.reconnect.clone());
            self.transport = Some(Attachment { handle, events });
        }
    }

    fn start_probe(&mut self) {
        self.probe_cancel.cancel();
        self.probe_cancel = CancellationToken::new();
        self.probe_id += 1;

        let id = self.probe_id;
        let token = self.probe_cancel.clone();
        let probe = self.ctx.probe.clone();
        let bearer = self.ctx.session.bearer_token();
        let host = self.network.lock().host.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                outcome = probe.classify(&host, bearer.as_deref()) => {
                    let _ = tx.send(Internal::Probe { id, outcome }).await;
                }
            }
        });
    }

    /// Quit the transport and drain its events so ident and channel state
    /// end up released, then tell viewers where the network was left.
    async fn teardown(&mut self) {
        self.scheduled.cancel();
        self.probe_cancel.cancel();
        if let Some(mut attachment) = self.transport.take() {
            let _ = attachment.handle.quit(None).await;
            while let Some(event) = attachment.events.recv().await {
                let mut net = self.network.lock();
                self.supervisor.handle(&mut net, Input::Transport(event));
            }
        }
        self.ctx.publisher.publish_status(&self.network.lock());
    }
}

async fn next_event(transport: &mut Option<Attachment>) -> Option<TransportEvent> {
    match transport {
        Some(t) => t.events.recv().await,
        None => std::future::pending().await,
    }
}
