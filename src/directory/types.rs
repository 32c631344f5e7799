//! Address record type and field updates.

use crate::normalize::{
    collapse_whitespace, describe_building, normalize_address_text, normalize_handle,
    normalize_secondary_handle,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current directory schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// One community member's postal entry.
///
/// `handle` is always stored normalized and is the identity used for upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub handle: String,
    pub secondary_handle: String,
    pub name: String,
    pub address: String,
    pub wishes: String,
    pub approved: bool,
    /// Reserved: not collected by any conversation step yet.
    pub phone: String,
    /// Reserved: not collected by any conversation step yet.
    pub email: String,
}

impl AddressRecord {
    /// Zero-value record for `handle` (normalized).
    #[must_use]
    pub fn new(handle: &str) -> Self {
        Self {
            handle: normalize_handle(handle),
            ..Default::default()
        }
    }

    /// True when nothing user-visible has been filled in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secondary_handle.trim().is_empty()
            && self.name.trim().is_empty()
            && self.address.trim().is_empty()
            && self.wishes.trim().is_empty()
    }

    /// True when the record has a postal address.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }

    /// Postcard-ready text: name, address and wishes.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        let name = self.name.trim();
        if !name.is_empty() {
            parts.push(format!("{name}."));
        }
        let address = self.address.trim();
        if !address.is_empty() {
            match describe_building(address) {
                Some(building) => parts.push(format!("Адрес: {address} ({building}).")),
                None => parts.push(format!("Адрес: {address}.")),
            }
        }
        let wishes = self.wishes.trim();
        if !wishes.is_empty() {
            parts.push(format!("Пожелания: {wishes}."));
        }
        parts.join(" ")
    }
}

impl std::fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// A single user-submitted field change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Address(String),
    SecondaryHandle(String),
    Wishes(String),
    Name(String),
}

impl FieldUpdate {
    /// Write the (normalized) value into `record`.
    pub fn apply(&self, record: &mut AddressRecord) {
        match self {
            Self::Address(text) => record.address = normalize_address_text(text),
            Self::SecondaryHandle(text) => {
                record.secondary_handle = normalize_secondary_handle(text);
            }
            Self::Wishes(text) => record.wishes = text.trim().to_owned(),
            Self::Name(text) => record.name = collapse_whitespace(text),
        }
    }

    /// Field name used in logs.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::SecondaryHandle(_) => "secondary_handle",
            Self::Wishes(_) => "wishes",
            Self::Name(_) => "name",
        }
    }
}

/// Seconds since the Unix epoch.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
