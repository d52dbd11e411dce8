//! Network and channel data model.
//!
//! [`NetworkConfig`] is what gets persisted; [`Network`] is the live record
//! the supervisor mutates. Status, membership and classification never
//! reach the persisted form.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zubr_irc::client::{ConnectConfig, SaslPlain};

use crate::server_options::ServerOptionsTable;

/// Maximum number of messages to keep per channel.
const MAX_MESSAGES: usize = 1000;

/// Placeholder name given to the default home network.
pub const HOME_SERVER_NAME: &str = "Home Server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChanType {
    Lobby,
    Channel,
    Query,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChanState {
    Parted,
    Joined,
}

/// Server family, as classified by the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerType {
    #[default]
    #[serde(skip)]
    Unknown,
    #[serde(rename = "zubr")]
    Enhanced,
    #[serde(rename = "irc")]
    Plain,
}

impl ServerType {
    /// `None` while unclassified, so status snapshots omit the field.
    pub fn known(self) -> Option<Self> {
        match self {
            ServerType::Unknown => None,
            other => Some(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZubrRole {
    Owner,
    Admin,
    User,
}

/// Metadata an enhanced server reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub signup_mode: Option<String>,
    pub source_code: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionFlags {
    pub connected: bool,
    pub secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgKind {
    Notice,
    Error,
    Raw,
    Info,
}

/// A message shown in a channel buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Msg {
    pub id: u64,
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MsgKind,
    pub text: String,
    #[serde(rename = "self")]
    pub is_self: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUser {
    pub nick: String,
    pub modes: Vec<char>,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub key: String,
    pub kind: ChanType,
    pub state: ChanState,
    pub users: HashMap<String, ChannelUser>,
    pub messages: VecDeque<Msg>,
}

impl Channel {
    pub fn new(name: &str, kind: ChanType) -> Self {
        Self {
            name: name.to_string(),
            key: String::new(),
            kind,
            state: ChanState::Parted,
            users: HashMap::new(),
            messages: VecDeque::new(),
        }
    }

    pub fn push(&mut self, msg: Msg) {
        self.messages.push_back(msg);
        if self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
    }

    /// Membership is presence-derived; drop it when the connection goes.
    pub fn mark_parted(&mut self) {
        self.state = ChanState::Parted;
        self.users.clear();
    }
}

/// Persisted channel entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type", default = "default_chan_type")]
    pub kind: ChanType,
}

fn default_chan_type() -> ChanType {
    ChanType::Channel
}

/// Persisted network entry, as stored in the user config.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub uuid: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub reject_unauthorized: bool,
    pub password: String,
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// `""` or `"plain"`.
    pub sasl: String,
    pub sasl_account: String,
    pub sasl_password: String,
    pub commands: Vec<String>,
    pub channels: Vec<ChannelConfig>,
    /// Asserted on every registration, ahead of the session's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_message: Option<String>,
    /// The user disconnected on purpose; don't connect on startup.
    pub user_disconnected: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            host: String::new(),
            port: 6697,
            tls: true,
            reject_unauthorized: true,
            password: String::new(),
            nick: String::new(),
            username: String::new(),
            realname: String::new(),
            sasl: String::new(),
            sasl_account: String::new(),
            sasl_password: String::new(),
            commands: Vec::new(),
            channels: Vec::new(),
            away_message: None,
            user_disconnected: false,
        }
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("sasl", &self.sasl)
            .field("channels", &self.channels)
            .field("away_message", &self.away_message)
            .field("user_disconnected", &self.user_disconnected)
            .finish_non_exhaustive()
    }
}

/// Live state of one configured network.
pub struct Network {
    pub uuid: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub reject_unauthorized: bool,
    pub password: Option<String>,
    pub sasl: Option<SaslPlain>,
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub lobby: Channel,
    pub channels: Vec<Channel>,
    pub commands: Vec<String>,
    pub away_message: Option<String>,
    /// Nick we lost to a collision and still want back.
    pub keep_nick: Option<String>,
    pub user_disconnected: bool,
    pub server_type: ServerType,
    pub zubr_role: Option<ZubrRole>,
    pub instance: InstanceInfo,
    pub server_options: ServerOptionsTable,
    pub status: ConnectionFlags,
    pub enabled_caps: Vec<String>,
    next_msg_id: u64,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("server_type", &self.server_type)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Network {
    pub fn from_config(config: NetworkConfig) -> Self {
        let nick = if config.nick.is_empty() {
            "zubr-user".to_string()
        } else {
            config.nick
        };
        let username = if config.username.is_empty() {
            nick.clone()
        } else {
            config.username
        };
        let realname = if config.realname.is_empty() {
            nick.clone()
        } else {
            config.realname
        };
        let sasl = (config.sasl.eq_ignore_ascii_case("plain") && !config.sasl_account.is_empty())
            .then(|| SaslPlain {
                account: config.sasl_account,
                password: config.sasl_password,
            });
        let channels = config
            .channels
            .into_iter()
            .map(|c| {
                let mut chan = Channel::new(&c.name, c.kind);
                chan.key = c.key;
                chan
            })
            .collect();

        Self {
            uuid: config.uuid,
            lobby: Channel::new(&config.name, ChanType::Lobby),
            name: config.name,
            host: config.host,
            port: config.port,
            tls: config.tls,
            reject_unauthorized: config.reject_unauthorized,
            password: (!config.password.is_empty()).then_some(config.password),
            sasl,
            nick,
            username,
            realname,
            channels,
            commands: config.commands,
            away_message: config.away_message.filter(|m| !m.is_empty()),
            keep_nick: None,
            user_disconnected: config.user_disconnected,
            server_type: ServerType::Unknown,
            zubr_role: None,
            instance: InstanceInfo::default(),
            server_options: ServerOptionsTable::default(),
            status: ConnectionFlags::default(),
            enabled_caps: Vec::new(),
            next_msg_id: 0,
        }
    }

    /// The persisted form.
    pub fn export(&self) -> NetworkConfig {
        let (sasl, sasl_account, sasl_password) = match self.sasl {
            Some(ref s) => ("plain".to_string(), s.account.clone(), s.password.clone()),
            None => (String::new(), String::new(), String::new()),
        };
        NetworkConfig {
            uuid: self.uuid,
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
            reject_unauthorized: self.reject_unauthorized,
            password: self.password.clone().unwrap_or_default(),
            nick: self.keep_nick.clone().unwrap_or_else(|| self.nick.clone()),
            username: self.username.clone(),
            realname: self.realname.clone(),
            sasl,
            sasl_account,
            sasl_password,
            commands: self.commands.clone(),
            channels: self
                .channels
                .iter()
                .filter(|c| matches!(c.kind, ChanType::Channel | ChanType::Query))
                .map(|c| ChannelConfig {
                    name: c.name.clone(),
                    key: c.key.clone(),
                    kind: c.kind,
                })
                .collect(),
            away_message: self.away_message.clone(),
            user_disconnected: self.user_disconnected,
        }
    }

    /// Transport settings for the next attachment.
    pub fn connect_config(&self, raw_events: bool) -> ConnectConfig {
        ConnectConfig {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
            tls_insecure: !self.reject_unauthorized,
            password: self.password.clone(),
            nick: self.nick.clone(),
            user: self.username.clone(),
            realname: self.realname.clone(),
            sasl: self.sasl.clone(),
            raw_events,
            ..Default::default()
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.lobby.name = name.to_string();
    }

    /// Append a message to the lobby and return a copy for viewers.
    pub fn push_lobby(&mut self, kind: MsgKind, text: impl Into<String>, is_self: bool) -> Msg {
        self.next_msg_id += 1;
        let msg = Msg {
            id: self.next_msg_id,
            time: Utc::now(),
            kind,
            text: text.into(),
            is_self,
        };
        self.lobby.push(msg.clone());
        msg
    }

    /// Lobby first, then the configured channels.
    pub fn all_channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        std::iter::once(&mut self.lobby).chain(self.channels.iter_mut())
    }

    pub fn find_channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}
