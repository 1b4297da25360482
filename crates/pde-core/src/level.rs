use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PdeError;

/// When protected content may be decrypted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionLevel {
    /// Readable only while the device is unlocked (L2).
    WhileUnlocked,
    /// Readable from the first unlock until the next reboot (L1).
    AfterFirstUnlock,
    /// Not protected.
    Always,
}

impl ProtectionLevel {
    #[cfg(test)]
    const ALL: [ProtectionLevel; 3] = [
        ProtectionLevel::WhileUnlocked,
        ProtectionLevel::AfterFirstUnlock,
        ProtectionLevel::Always,
    ];

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            ProtectionLevel::Always => 0,
            ProtectionLevel::AfterFirstUnlock => 1,
            ProtectionLevel::WhileUnlocked => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ProtectionLevel::Always),
            1 => Some(ProtectionLevel::AfterFirstUnlock),
            2 => Some(ProtectionLevel::WhileUnlocked),
            _ => None,
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectionLevel::WhileUnlocked => "WhileUnlocked",
            ProtectionLevel::AfterFirstUnlock => "AfterFirstUnlock",
            ProtectionLevel::Always => "Always",
        };
        f.write_str(name)
    }
}

impl FromStr for ProtectionLevel {
    type Err = PdeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "while-unlocked" | "whileunlocked" | "l2" => Ok(ProtectionLevel::WhileUnlocked),
            "after-first-unlock" | "afterfirstunlock" | "l1" => {
                Ok(ProtectionLevel::AfterFirstUnlock)
            }
            "always" | "none" => Ok(ProtectionLevel::Always),
            other => Err(PdeError::Settings(format!(
                "unknown protection level '{other}'"
            ))),
        }
    }
}

/// Outcome of protecting a file or folder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemProtectionStatus {
    Succeeded,
    NotProtectable,
    DataUnavailable,
}

impl ItemProtectionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ItemProtectionStatus::Succeeded)
    }
}

impl fmt::Display for ItemProtectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemProtectionStatus::Succeeded => "Succeeded",
            ItemProtectionStatus::NotProtectable => "NotProtectable",
            ItemProtectionStatus::DataUnavailable => "DataUnavailable",
        };
        f.write_str(name)
    }
}

/// Outcome of unprotecting a buffer. `Unavailable` is a normal status
/// (the device is locked, or has not been unlocked since boot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferUnprotectResult {
    Succeeded(Vec<u8>),
    Unavailable,
}
