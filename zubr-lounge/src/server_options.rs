//! Negotiated server metadata for one network.
//!
//! Updates only ever add knowledge: a field the server advertised once is
//! kept until the table is reset for a fresh attachment.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use zubr_irc::isupport::{PrefixEntry, ServerOptionsUpdate};

/// Channel-membership prefixes, highest rank first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTable {
    entries: Vec<PrefixEntry>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self {
            entries: vec![
                PrefixEntry { mode: 'o', symbol: '@' },
                PrefixEntry { mode: 'v', symbol: '+' },
            ],
        }
    }
}

impl PrefixTable {
    /// Replace the table. An empty advertisement is ignored.
    pub fn update(&mut self, entries: &[PrefixEntry]) {
        if entries.is_empty() {
            return;
        }
        self.entries = entries.to_vec();
    }

    pub fn entries(&self) -> &[PrefixEntry] {
        &self.entries
    }

    pub fn symbol_for(&self, mode: char) -> Option<char> {
        self.entries.iter().find(|e| e.mode == mode).map(|e| e.symbol)
    }

    pub fn symbols(&self) -> Vec<char> {
        self.entries.iter().map(|e| e.symbol).collect()
    }
}

// Viewers expect `{prefix, modeToSymbol, symbols}`.
impl Serialize for PrefixTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mode_to_symbol: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|e| (e.mode.to_string(), e.symbol.to_string()))
            .collect();
        let mut s = serializer.serialize_struct("PrefixTable", 3)?;
        s.serialize_field("prefix", &self.entries)?;
        s.serialize_field("modeToSymbol", &mode_to_symbol)?;
        s.serialize_field("symbols", &self.symbols())?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerOptionsTable {
    #[serde(rename = "CHANTYPES")]
    pub chantypes: Vec<char>,
    #[serde(rename = "PREFIX")]
    pub prefix: PrefixTable,
    #[serde(rename = "NETWORK")]
    pub network: Option<String>,
}

impl Default for ServerOptionsTable {
    fn default() -> Self {
        Self {
            chantypes: vec!['#', '&'],
            prefix: PrefixTable::default(),
            network: None,
        }
    }
}

impl ServerOptionsTable {
    /// Fold in a partial advertisement. Absent fields leave known values alone.
    pub fn merge(&mut self, update: &ServerOptionsUpdate) {
        if let Some(ref prefix) = update.prefix {
            self.prefix.update(prefix);
        }
        if let Some(ref chantypes) = update.chantypes
            && !chantypes.is_empty()
        {
            self.chantypes = chantypes.clone();
        }
        if let Some(ref network) = update.network {
            self.network = Some(network.clone());
        }
    }

    /// Back to defaults for a fresh attachment.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_channel_name(&self, name: &str) -> bool {
        name.chars().next().is_some_and(|c| self.chantypes.contains(&c))
    }
}
