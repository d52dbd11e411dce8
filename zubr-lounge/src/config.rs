//! Lounge configuration.
//!
//! Process settings come from the command line (with `ZUBR_*` environment
//! fallbacks). Lounge-wide behaviour lives in `~/.config/zubr/lounge.toml`.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use zubr_irc::reconnect::ReconnectConfig;

use crate::network::{ChannelConfig, ChanType, HOME_SERVER_NAME, NetworkConfig};
use crate::supervisor::SupervisorConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "zubr-lounge", about = "Persistent IRC session for one Zubr user")]
pub struct Cli {
    /// Lounge settings file. Default: ~/.config/zubr/lounge.toml
    #[arg(long, env = "ZUBR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for local user configs. Default: ~/.local/share/zubr
    #[arg(long, env = "ZUBR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Account name of the session.
    #[arg(long, env = "ZUBR_USER")]
    pub user: Option<String>,

    /// Stored bearer token for the account service.
    #[arg(long, env = "ZUBR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Password for a fresh login when no token is stored.
    #[arg(long, env = "ZUBR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep the user config on local disk instead of the account service.
    #[arg(long)]
    pub local: bool,

    /// Session-wide away message to restore on connect.
    #[arg(long)]
    pub away: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Mirror raw protocol lines into each network's lobby.
    pub raw: bool,
    /// Mirror transport diagnostics into each network's lobby.
    pub framework: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZubrServerConfig {
    /// Account service base URL.
    pub url: String,
    /// The instance allows guest sessions.
    pub public: bool,
}

impl Default for ZubrServerConfig {
    fn default() -> Self {
        Self {
            url: crate::api::DEFAULT_BASE_URL.to_string(),
            public: false,
        }
    }
}

/// Template for the network every new user starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeServerConfig {
    pub enabled: bool,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub reject_unauthorized: bool,
    pub channels: Vec<String>,
}

impl Default for HomeServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: HOME_SERVER_NAME.to_string(),
            host: "127.0.0.1".to_string(),
            port: 6667,
            tls: false,
            reject_unauthorized: true,
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoungeConfig {
    /// Use the viewer's IP (as hex) for ident instead of the account name.
    pub use_hex_ip: bool,
    pub debug: DebugConfig,
    pub zubr_server: ZubrServerConfig,
    pub home_server: HomeServerConfig,
    pub reconnect: ReconnectConfig,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zubr")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zubr")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("lounge.toml")
}

impl LoungeConfig {
    /// Load from `path`, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => tracing::warn!("Bad config file {}: {e}", path.display()),
                },
                Err(e) => tracing::warn!("Can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(path, s) {
                    tracing::warn!("Can't save config: {e}");
                }
            }
            Err(e) => tracing::warn!("Can't serialize config: {e}"),
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            use_hex_ip: self.use_hex_ip,
            debug_raw: self.debug.raw,
            debug_framework: self.debug.framework,
        }
    }

    /// Network a user without saved networks starts with.
    pub fn home_network(&self, user: &str) -> NetworkConfig {
        let home = &self.home_server;
        NetworkConfig {
            name: home.name.clone(),
            host: home.host.clone(),
            port: home.port,
            tls: home.tls,
            reject_unauthorized: home.reject_unauthorized,
            nick: user.to_string(),
            username: user.to_string(),
            realname: user.to_string(),
            channels: home
                .channels
                .iter()
                .map(|name| ChannelConfig {
                    name: name.clone(),
                    key: String::new(),
                    kind: ChanType::Channel,
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Secure defaults for a network on another instance. The identity is
/// derived from the user's home domain so it stays unique across instances.
pub fn remote_network(host: &str, user: &str, home_domain: &str) -> NetworkConfig {
    NetworkConfig {
        name: host.to_string(),
        host: host.to_string(),
        nick: format!("{user}_{}", home_domain.replace('.', "-")),
        username: format!("{user}_{home_domain}"),
        realname: format!("{user}@{home_domain}"),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: LoungeConfig = toml::from_str("").unwrap();
        assert_eq!(config, LoungeConfig::default());
        assert_eq!(config.home_server.port, 6667);
        assert!(!config.home_server.tls);
    }

    #[test]
    fn partial_file() {
        let config: LoungeConfig = toml::from_str(
            r##"
use_hex_ip = true

[debug]
raw = true

[home_server]
host = "irc.zubr.chat"
channels = ["#lobby"]
"##,
        )
        .unwrap();
        assert!(config.use_hex_ip);
        assert!(config.supervisor().debug_raw);
        assert!(!config.supervisor().debug_framework);
        let home = config.home_network("alice");
        assert_eq!(home.name, HOME_SERVER_NAME);
        assert_eq!(home.host, "irc.zubr.chat");
        assert_eq!(home.nick, "alice");
        assert_eq!(home.channels[0].name, "#lobby");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zubr").join("lounge.toml");
        let mut config = LoungeConfig::default();
        config.zubr_server.public = true;
        config.save(&path);
        assert_eq!(LoungeConfig::load(&path), config);
    }

    #[test]
    fn remote_identity_uses_home_domain() {
        let net = remote_network("irc.other.net", "alice", "zubr.chat");
        assert_eq!(net.nick, "alice_zubr-chat");
        assert_eq!(net.username, "alice_zubr.chat");
        assert_eq!(net.realname, "alice@zubr.chat");
        assert_eq!(net.port, 6697);
        assert!(net.tls && net.reject_unauthorized);
    }
}
