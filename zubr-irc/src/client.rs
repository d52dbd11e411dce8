//! IRC transport with lifecycle events and automatic reconnection.
//!
//! [`connect`] spawns one task per network. The task owns the socket, runs
//! registration (CAP negotiation, optional SASL PLAIN), answers PINGs,
//! detects ping timeouts and, after an unexpected close, asks the
//! [`ReconnectScheduler`] whether and when to try again. Everything the
//! session layer needs to know arrives as an ordered stream of
//! [`TransportEvent`]s.
//!
//! The event channel closes when the task has fully torn down, which is the
//! signal consumers use before starting a new attachment.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::{SocketInfo, TransportEvent};
use crate::irc::Message;
use crate::isupport::{ServerOptionsUpdate, parse_isupport};
use crate::reconnect::{ReconnectConfig, ReconnectScheduler};

/// Capabilities requested when the server offers them.
const WANTED_CAPS: &[&str] = &[
    "multi-prefix",
    "server-time",
    "message-tags",
    "away-notify",
    "account-notify",
    "extended-join",
    "batch",
];

/// Alternate nicks tried before registration gives up.
const MAX_NICK_TRIES: u32 = 5;

/// Longest line accepted from the server, tags included. Anything past this
/// is discarded up to the next newline.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// SASL PLAIN credentials.
#[derive(Clone)]
pub struct SaslPlain {
    pub account: String,
    pub password: String,
}

impl fmt::Debug for SaslPlain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslPlain")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for connecting to an IRC server.
#[derive(Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
    /// Server password (PASS).
    pub password: Option<String>,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    pub sasl: Option<SaslPlain>,
    /// Emit [`TransportEvent::Raw`] for every line in both directions.
    pub raw_events: bool,
    /// Send a client PING after this much silence.
    pub ping_interval: Duration,
    /// Give up on the socket after this much silence.
    pub ping_timeout: Duration,
    /// Limit for the TCP connect and, separately, the TLS handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            tls: false,
            tls_insecure: false,
            password: None,
            nick: "zubr".to_string(),
            user: "zubr".to_string(),
            realname: "Zubr User".to_string(),
            sasl: None,
            raw_events: false,
            ping_interval: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("tls_insecure", &self.tls_insecure)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("nick", &self.nick)
            .field("user", &self.user)
            .field("realname", &self.realname)
            .field("sasl", &self.sasl)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Commands the consumer can send to the transport.
#[derive(Debug)]
pub enum Command {
    Raw(String),
    Join { channel: String, key: Option<String> },
    Privmsg { target: String, text: String },
    /// `None` clears the away state.
    Away(Option<String>),
    /// Change nick now (if registered) and use it for future registrations.
    Nick(String),
    /// Disconnect and do not reconnect.
    Quit(Option<String>),
    /// Skip the remaining reconnect wait.
    Reconnect,
}

/// A handle to a running transport.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    pub async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }

    pub async fn join(&self, channel: &str, key: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Join {
                channel: channel.to_string(),
                key: key.map(str::to_string),
            })
            .await?;
        Ok(())
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn away(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx.send(Command::Away(message.map(str::to_string))).await?;
        Ok(())
    }

    pub async fn nick(&self, nick: &str) -> Result<()> {
        self.cmd_tx.send(Command::Nick(nick.to_string())).await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx.send(Command::Quit(message.map(str::to_string))).await?;
        Ok(())
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.cmd_tx.send(Command::Reconnect).await?;
        Ok(())
    }

    /// True once the transport task has gone away.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Start a transport task.
///
/// Returns a handle for sending commands and a receiver for lifecycle
/// events. The receiver yields `None` once the task has finished.
pub fn connect(
    config: ConnectConfig,
    reconnect: ReconnectConfig,
) -> (ClientHandle, mpsc::Receiver<TransportEvent>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let transport = Transport {
        config,
        scheduler: ReconnectScheduler::new(reconnect),
        known_options: ServerOptionsUpdate::default(),
        event_tx,
        cmd_rx,
    };
    tokio::spawn(transport.run());

    (ClientHandle { cmd_tx }, event_rx)
}

/// How one attachment ended.
#[derive(Debug, PartialEq)]
enum AttachmentEnd {
    /// The consumer asked us to quit.
    Quit,
    /// The connection dropped for any other reason.
    Dropped,
}

struct Transport {
    config: ConnectConfig,
    scheduler: ReconnectScheduler,
    /// Options learned so far, replayed on the next `SocketConnected`.
    known_options: ServerOptionsUpdate,
    event_tx: mpsc::Sender<TransportEvent>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl Transport {
    async fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn run(mut self) {
        loop {
            self.emit(TransportEvent::Connecting).await;
            if self.attach().await == AttachmentEnd::Quit {
                break;
            }
            let Some(attempt) = self.scheduler.next_attempt() else {
                break;
            };
            self.emit(TransportEvent::Reconnecting(attempt)).await;
            tracing::debug!(
                host = %self.config.host,
                attempt = attempt.attempt,
                wait_ms = attempt.wait.as_millis() as u64,
                "Waiting before reconnect"
            );
            if !self.wait_before_retry(attempt.wait).await {
                break;
            }
        }
        self.emit(TransportEvent::Close).await;
    }

    /// Returns false if the consumer quit (or went away) during the wait.
    async fn wait_before_retry(&mut self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Quit(_)) => return false,
                    Some(Command::Reconnect) => return true,
                    Some(Command::Nick(nick)) => self.config.nick = nick,
                    Some(other) => {
                        tracing::debug!("Dropping command while disconnected: {other:?}");
                    }
                },
            }
        }
    }

    /// One attachment: connect, register, pump until the socket goes away.
    async fn attach(&mut self) -> AttachmentEnd {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let limit = self.config.connect_timeout;
        let mut early = Vec::new();
        tracing::debug!("Resolving {addr}...");

        let connecting = TcpStream::connect((self.config.host.clone(), self.config.port));
        let tcp = match self.interruptible(connecting, &mut early).await {
            Ok(Some(Ok(tcp))) => tcp,
            Ok(None) => {
                self.emit(TransportEvent::SocketClose { error: None }).await;
                return AttachmentEnd::Quit;
            }
            Ok(Some(Err(e))) => return self.dropped(format!("TCP connect to {addr} failed: {e}")).await,
            Err(_) => {
                let e = format!("TCP connect to {addr} timed out after {}s", limit.as_secs());
                return self.dropped(e).await;
            }
        };
        if let (Ok(local), Ok(peer)) = (tcp.local_addr(), tcp.peer_addr()) {
            self.emit(TransportEvent::RawSocketConnected(SocketInfo { local, peer }))
                .await;
        }

        let result = if self.config.tls {
            let handshake = match self.tls_handshake(tcp) {
                Ok(handshake) => handshake,
                Err(e) => return self.dropped(e.to_string()).await,
            };
            match self.interruptible(handshake, &mut early).await {
                Ok(Some(Ok(tls))) => {
                    tracing::debug!("TLS handshake with {addr} complete");
                    self.drive(tls, early).await
                }
                Ok(None) => Ok(AttachmentEnd::Quit),
                Ok(Some(Err(e))) => Err(anyhow::anyhow!(
                    "TLS handshake with {} failed: {e}",
                    self.config.host
                )),
                Err(_) => Err(anyhow::anyhow!(
                    "TLS handshake with {} timed out after {}s",
                    self.config.host,
                    limit.as_secs()
                )),
            }
        } else {
            self.drive(tcp, early).await
        };

        match result {
            Ok(end) => {
                self.emit(TransportEvent::SocketClose { error: None }).await;
                end
            }
            Err(e) => self.dropped(e.to_string()).await,
        }
    }

    async fn dropped(&self, reason: String) -> AttachmentEnd {
        self.emit(TransportEvent::SocketError(reason.clone())).await;
        self.emit(TransportEvent::SocketClose { error: Some(reason) }).await;
        AttachmentEnd::Dropped
    }

    /// Await one connection step under `connect_timeout` while still taking
    /// commands. `Ok(None)` means the consumer quit; commands meant for the
    /// server are held in `early` until registration.
    async fn interruptible<F: Future>(
        &mut self,
        step: F,
        early: &mut Vec<Command>,
    ) -> Result<Option<F::Output>, tokio::time::error::Elapsed> {
        let step = tokio::time::timeout(self.config.connect_timeout, step);
        tokio::pin!(step);
        loop {
            tokio::select! {
                result = &mut step => return result.map(Some),
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Quit(_)) => return Ok(None),
                    Some(Command::Reconnect) => {}
                    Some(Command::Nick(nick)) => self.config.nick = nick,
                    Some(other) => early.push(other),
                },
            }
        }
    }

    fn tls_handshake(
        &self,
        tcp: TcpStream,
    ) -> Result<tokio_rustls::Connect<TcpStream>> {
        let tls_config = if self.config.tls_insecure {
            tracing::debug!("TLS: insecure mode (skipping cert verification)");
            rustls_insecure_config()
        } else {
            rustls_default_config()
        };
        let connector = TlsConnector::from(Arc::new(tls_config));
        let dns_name = rustls::pki_types::ServerName::try_from(self.config.host.clone())?;
        Ok(connector.connect(dns_name, tcp))
    }

    /// Run the protocol over an established stream.
    async fn drive<S>(&mut self, stream: S, mut pending: Vec<Command>) -> Result<AttachmentEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.emit(TransportEvent::SocketConnected {
            options: self.known_options.clone(),
        })
        .await;

        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut wire = Wire {
            writer,
            event_tx: self.event_tx.clone(),
            raw_events: self.config.raw_events,
        };

        if let Some(ref pass) = self.config.password {
            wire.send(&format!("PASS {pass}")).await?;
        }
        wire.send("CAP LS 302").await?;
        wire.send(&format!("NICK {}", self.config.nick)).await?;
        wire.send(&format!("USER {} 0 * :{}", self.config.user, self.config.realname))
            .await?;

        let mut reg = Registration::new(self.config.nick.clone());
        let mut line_buf: Vec<u8> = Vec::new();
        let mut overlong = false;
        let mut last_activity = Instant::now();
        let mut pinged = false;

        loop {
            let ping_deadline = if pinged {
                last_activity + self.config.ping_timeout
            } else {
                last_activity + self.config.ping_interval
            };
            tokio::select! {
                result = read_line_capped(&mut reader, &mut line_buf) => {
                    if result? == 0 {
                        tracing::debug!(host = %self.config.host, "Server closed the connection");
                        return Ok(AttachmentEnd::Dropped);
                    }
                    last_activity = Instant::now();
                    pinged = false;
                    if line_buf.last() != Some(&b'\n') {
                        if line_buf.len() >= MAX_LINE_BYTES {
                            // Keep reading, but throw this line away.
                            line_buf.clear();
                            overlong = true;
                        }
                        continue;
                    }
                    if std::mem::take(&mut overlong) {
                        tracing::debug!(host = %self.config.host, "Dropped a line over {MAX_LINE_BYTES} bytes");
                        line_buf.clear();
                        continue;
                    }
                    // Not every client on a network speaks UTF-8.
                    let line = String::from_utf8_lossy(&line_buf).trim_end().to_string();
                    line_buf.clear();
                    if self.config.raw_events {
                        self.emit(TransportEvent::Raw { line: line.clone(), from_server: true }).await;
                    }
                    let Some(msg) = Message::parse(&line) else { continue };
                    let was_registered = reg.registered;
                    self.handle_line(&msg, &mut reg, &mut wire).await?;
                    if reg.registered && !was_registered {
                        for cmd in pending.drain(..) {
                            self.execute(cmd, &reg, &mut wire).await?;
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => {
                            let _ = wire.send("QUIT").await;
                            return Ok(AttachmentEnd::Quit);
                        }
                        Some(Command::Quit(msg)) => {
                            let line = match msg {
                                Some(m) => format!("QUIT :{m}"),
                                None => "QUIT".to_string(),
                            };
                            let _ = wire.send(&line).await;
                            let _ = wire.writer.shutdown().await;
                            return Ok(AttachmentEnd::Quit);
                        }
                        Some(Command::Reconnect) => {
                            tracing::debug!("Reconnect requested while connected, ignoring");
                        }
                        Some(Command::Nick(nick)) => {
                            self.config.nick = nick.clone();
                            if reg.registered {
                                wire.send(&format!("NICK {nick}")).await?;
                            }
                        }
                        Some(cmd) if reg.registered => self.execute(cmd, &reg, &mut wire).await?,
                        // Queue until registered
                        Some(cmd) => pending.push(cmd),
                    }
                }
                _ = tokio::time::sleep_until(ping_deadline) => {
                    if pinged {
                        self.emit(TransportEvent::PingTimeout).await;
                        return Ok(AttachmentEnd::Dropped);
                    }
                    wire.send("PING :keepalive").await?;
                    pinged = true;
                }
            }
        }
    }

    async fn handle_line<W: AsyncWrite + Unpin>(
        &mut self,
        msg: &Message,
        reg: &mut Registration,
        wire: &mut Wire<W>,
    ) -> Result<()> {
        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                wire.send(&format!("PONG :{token}")).await?;
            }
            "CAP" => self.handle_cap(msg, reg, wire).await?,
            "AUTHENTICATE" => {
                if msg.params.first().map(|s| s.as_str()) == Some("+")
                    && let Some(ref sasl) = self.config.sasl
                {
                    let payload = format!("{}\0{}\0{}", sasl.account, sasl.account, sasl.password);
                    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
                    wire.send(&format!("AUTHENTICATE {encoded}")).await?;
                }
            }
            "903" => {
                self.emit(TransportEvent::Debug("SASL authentication successful".into())).await;
                wire.send("CAP END").await?;
            }
            "902" | "904" | "905" | "906" => {
                let reason = msg.params.last().cloned().unwrap_or_default();
                self.emit(TransportEvent::Debug(format!("SASL authentication failed: {reason}")))
                    .await;
                wire.send("CAP END").await?;
            }
            "001" => {
                if let Some(nick) = msg.params.first() {
                    reg.nick = nick.clone();
                }
                reg.welcomed = true;
            }
            "005" => {
                let update = parse_isupport(&msg.params);
                if !update.is_empty() {
                    self.known_options.absorb(update.clone());
                    self.emit(TransportEvent::ServerOptions(update)).await;
                }
            }
            // End of MOTD / no MOTD: ISUPPORT has been sent by now
            "376" | "422" => {
                if reg.welcomed && !reg.registered {
                    reg.registered = true;
                    self.scheduler.registered();
                    self.emit(TransportEvent::Registered {
                        nick: reg.nick.clone(),
                        enabled_caps: reg.enabled_caps.clone(),
                    })
                    .await;
                }
            }
            // ERR_NICKNAMEINUSE
            "433" if !reg.registered => {
                reg.nick_tries += 1;
                if reg.nick_tries > MAX_NICK_TRIES {
                    anyhow::bail!("Nick in use");
                }
                let fallback = format!("{}{}", self.config.nick, reg.nick_tries);
                if reg.nick_tries == 1 {
                    self.emit(TransportEvent::NickInUse {
                        attempted: self.config.nick.clone(),
                        fallback: fallback.clone(),
                    })
                    .await;
                }
                reg.nick = fallback.clone();
                wire.send(&format!("NICK {fallback}")).await?;
            }
            "NICK" => {
                let old_nick = msg.source_nick().unwrap_or("").to_string();
                let new_nick = msg.params.first().cloned().unwrap_or_default();
                if !new_nick.is_empty() && old_nick.eq_ignore_ascii_case(&reg.nick) {
                    reg.nick = new_nick.clone();
                    if reg.registered {
                        self.emit(TransportEvent::NickChanged { old_nick, new_nick }).await;
                    }
                }
            }
            "ERROR" => {
                let text = msg.params.last().cloned().unwrap_or_default();
                self.emit(TransportEvent::Debug(format!("Server error: {text}"))).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_cap<W: AsyncWrite + Unpin>(
        &self,
        msg: &Message,
        reg: &mut Registration,
        wire: &mut Wire<W>,
    ) -> Result<()> {
        let subcmd = msg.params.get(1).map(|s| s.to_ascii_uppercase());
        match subcmd.as_deref() {
            Some("LS") => {
                let caps_str = msg.params.last().map(|s| s.as_str()).unwrap_or("");
                for cap in caps_str.split_whitespace() {
                    let name = cap.split('=').next().unwrap_or(cap);
                    reg.offered.push(name.to_string());
                }
                // "CAP * LS * :..." means more lines follow
                if msg.params.get(2).map(|s| s.as_str()) == Some("*") {
                    return Ok(());
                }
                let mut req: Vec<&str> = WANTED_CAPS
                    .iter()
                    .copied()
                    .filter(|c| reg.offered.iter().any(|o| o == c))
                    .collect();
                if self.config.sasl.is_some() && reg.offered.iter().any(|o| o == "sasl") {
                    req.push("sasl");
                }
                if req.is_empty() {
                    wire.send("CAP END").await?;
                } else {
                    wire.send(&format!("CAP REQ :{}", req.join(" "))).await?;
                }
            }
            Some("ACK") => {
                let caps = msg.params.last().map(|s| s.as_str()).unwrap_or("");
                reg.enabled_caps
                    .extend(caps.split_whitespace().map(str::to_string));
                if reg.enabled_caps.iter().any(|c| c == "sasl") {
                    wire.send("AUTHENTICATE PLAIN").await?;
                } else {
                    wire.send("CAP END").await?;
                }
            }
            Some("NAK") => {
                wire.send("CAP END").await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Execute a single command on the wire.
    async fn execute<W: AsyncWrite + Unpin>(
        &self,
        cmd: Command,
        reg: &Registration,
        wire: &mut Wire<W>,
    ) -> Result<()> {
        match cmd {
            Command::Raw(line) => wire.send(&line).await?,
            Command::Join { channel, key } => match key {
                Some(key) if !key.is_empty() => wire.send(&format!("JOIN {channel} {key}")).await?,
                _ => wire.send(&format!("JOIN {channel}")).await?,
            },
            Command::Privmsg { target, text } => {
                wire.send(&format!("PRIVMSG {target} :{text}")).await?
            }
            Command::Away(Some(message)) => wire.send(&format!("AWAY :{message}")).await?,
            Command::Away(None) => wire.send("AWAY").await?,
            Command::Nick(nick) => {
                if reg.registered {
                    wire.send(&format!("NICK {nick}")).await?
                }
            }
            Command::Quit(_) | Command::Reconnect => {}
        }
        Ok(())
    }
}

/// Per-attachment registration progress.
struct Registration {
    nick: String,
    nick_tries: u32,
    welcomed: bool,
    registered: bool,
    offered: Vec<String>,
    enabled_caps: Vec<String>,
}

impl Registration {
    fn new(nick: String) -> Self {
        Self {
            nick,
            nick_tries: 0,
            welcomed: false,
            registered: false,
            offered: Vec::new(),
            enabled_caps: Vec::new(),
        }
    }
}

/// Read up to the next newline into `buf`, never letting it grow past
/// [`MAX_LINE_BYTES`]. Cancel safe: a partial line stays in `buf`.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let room = MAX_LINE_BYTES.saturating_sub(buf.len()).max(1) as u64;
    reader.take(room).read_until(b'\n', buf).await
}

/// Write half plus raw-line mirroring.
struct Wire<W> {
    writer: W,
    event_tx: mpsc::Sender<TransportEvent>,
    raw_events: bool,
}

impl<W: AsyncWrite + Unpin> Wire<W> {
    async fn send(&mut self, line: &str) -> Result<()> {
        // One command per line, no smuggled CR/LF.
        let line = line.replace(['\r', '\n'], " ");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        if self.raw_events {
            let redacted = if line.starts_with("PASS ") || line.starts_with("AUTHENTICATE ") {
                let verb = line.split(' ').next().unwrap_or("");
                format!("{verb} ****")
            } else {
                line
            };
            let _ = self
                .event_tx
                .send(TransportEvent::Raw { line: redacted, from_server: false })
                .await;
        }
        Ok(())
    }
}

fn install_crypto_provider() {
    // ring is preferred when both are enabled; aws-lc-rs is the default.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    install_crypto_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}
