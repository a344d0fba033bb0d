use std::fmt;

use serde::{Deserialize, Serialize};

pub const ENTRY_VERSION: u32 = 2;
pub const ENTRY_TITLE_PREFIX: &str = "Shell Recharge Charger";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargerId(String);

impl ChargerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardRfid(String);

impl CardRfid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardRfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment card attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub rfid: CardRfid,
    #[serde(default)]
    pub name: Option<String>,
}

/// Charger registered on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charger {
    pub id: ChargerId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Data persisted for one configured charger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub email: String,
    pub password: String,
    pub card_rfid: CardRfid,
    pub charger_id: ChargerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub version: u32,
    pub data: EntryData,
    pub created_at: String,
    pub updated_at: String,
}

impl ConfigEntry {
    pub fn unique_id(&self) -> &ChargerId {
        &self.data.charger_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub version: u32,
    pub data: EntryData,
    pub created_at: String,
}

pub fn entry_title(charger_id: &ChargerId) -> String {
    format!("{ENTRY_TITLE_PREFIX} {charger_id}")
}
