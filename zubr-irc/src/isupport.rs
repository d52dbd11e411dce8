//! RPL_ISUPPORT (005) parsing.
//!
//! Only the tokens the session core consumes are kept: `PREFIX`,
//! `CHANTYPES` and `NETWORK`. Every other token is ignored.

use serde::{Deserialize, Serialize};

/// One `PREFIX` entry: channel mode letter and the nick symbol it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixEntry {
    pub mode: char,
    pub symbol: char,
}

/// A partial server-options advertisement.
///
/// `None` means "not mentioned in this batch", which is different from
/// "cleared". Consumers must merge, never replace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptionsUpdate {
    pub prefix: Option<Vec<PrefixEntry>>,
    pub chantypes: Option<Vec<char>>,
    pub network: Option<String>,
}

impl ServerOptionsUpdate {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.chantypes.is_none() && self.network.is_none()
    }

    /// Fold a later update into this one (later values win per field).
    pub fn absorb(&mut self, other: ServerOptionsUpdate) {
        if other.prefix.is_some() {
            self.prefix = other.prefix;
        }
        if other.chantypes.is_some() {
            self.chantypes = other.chantypes;
        }
        if other.network.is_some() {
            self.network = other.network;
        }
    }
}

/// Parse the parameters of a 005 reply.
///
/// `params[0]` is our nick and the last parameter is the human-readable
/// "are supported by this server" text; both are skipped.
pub fn parse_isupport(params: &[String]) -> ServerOptionsUpdate {
    let mut update = ServerOptionsUpdate::default();
    if params.len() < 2 {
        return update;
    }
    for token in &params[1..params.len() - 1] {
        // A leading '-' negates a token; we never un-learn a value.
        if token.starts_with('-') {
            continue;
        }
        let (key, value) = token.split_once('=').unwrap_or((token.as_str(), ""));
        match key.to_ascii_uppercase().as_str() {
            "PREFIX" => {
                if let Some(entries) = parse_prefix(value) {
                    update.prefix = Some(entries);
                }
            }
            "CHANTYPES" => {
                if !value.is_empty() {
                    update.chantypes = Some(value.chars().collect());
                }
            }
            "NETWORK" => {
                if !value.is_empty() {
                    update.network = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
    update
}

/// `(ov)@+` → `[o→@, v→+]`. Returns `None` when the shape is invalid.
pub fn parse_prefix(value: &str) -> Option<Vec<PrefixEntry>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    let inner = value.strip_prefix('(')?;
    let (modes, symbols) = inner.split_once(')')?;
    if modes.chars().count() != symbols.chars().count() {
        return None;
    }
    Some(
        modes
            .chars()
            .zip(symbols.chars())
            .map(|(mode, symbol)| PrefixEntry { mode, symbol })
            .collect(),
    )
}
