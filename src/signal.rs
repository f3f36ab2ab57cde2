//! Cellular signal descriptor carried by health-check packets.
//!
//! Devices report either a bare CSQ number (`"26"`, `"99"`) or a
//! `;`-separated descriptor such as `"CSQ:26;BP:0"`, where `BP` is the
//! backup-power flag.

use crate::Error;
use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// CSQ value modems use to report "not known or not detectable".
pub const NO_NETWORK_CSQ: i32 = 99;

/// Value used for a CSQ or backup-power field that could not be read.
pub const MISSING: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SignalQuality {
    NoNetwork,
    Weak,
    Normal,
    Better,
}

impl SignalQuality {
    pub fn from_csq(csq: i32) -> Self {
        match csq {
            0..=16 => SignalQuality::Weak,
            17..=20 => SignalQuality::Normal,
            21..=31 => SignalQuality::Better,
            // 99 and anything out of range
            _ => SignalQuality::NoNetwork,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            SignalQuality::NoNetwork => "no-network",
            SignalQuality::Weak => "weak",
            SignalQuality::Normal => "normal",
            SignalQuality::Better => "better",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalQuality::NoNetwork => "No network",
            SignalQuality::Weak => "Weak signal",
            SignalQuality::Normal => "Normal signal",
            SignalQuality::Better => "Good signal",
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Number of bars (0-4) to show for a CSQ value.
pub fn signal_bars(csq: i32) -> u8 {
    match csq {
        13..=16 => 1,
        17..=20 => 2,
        21..=25 => 3,
        26..=31 => 4,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalInfo {
    /// Raw CSQ value, [`MISSING`] if unparsable.
    pub csq: i32,
    /// Backup-power flag, [`MISSING`] if the descriptor has no `BP:` field.
    pub backup_power: i32,
}

impl SignalInfo {
    pub fn quality(&self) -> SignalQuality {
        SignalQuality::from_csq(self.csq)
    }

    pub fn description(&self) -> &'static str {
        self.quality().description()
    }

    pub fn bars(&self) -> u8 {
        signal_bars(self.csq)
    }

    pub fn has_backup_power(&self) -> Option<bool> {
        match self.backup_power {
            MISSING => None,
            flag => Some(flag != 0),
        }
    }
}

fn trim(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

fn field_value(rest: &str) -> Option<i32> {
    rest.split(';').next()?.trim().parse().ok()
}

fn parse_csq(text: &str) -> Option<i32> {
    if text == "99" {
        return Some(NO_NETWORK_CSQ);
    }
    match text.strip_prefix("CSQ:") {
        Some(rest) => field_value(rest),
        None => text.parse().ok(),
    }
}

fn parse_backup_power(text: &str) -> Option<i32> {
    let start = text.find("BP:")? + "BP:".len();
    field_value(&text[start..])
}

/// Parses a signal descriptor. Never fails: unreadable fields degrade to
/// [`MISSING`], which classifies as [`SignalQuality::NoNetwork`].
pub fn parse_signal(text: &str) -> SignalInfo {
    let text = trim(text);
    let info = SignalInfo {
        csq: parse_csq(text).unwrap_or(MISSING),
        backup_power: parse_backup_power(text).unwrap_or(MISSING),
    };
    log::trace!("Signal descriptor {text:?} parsed as {info:?}");
    info
}

/// Strict form of [`parse_signal`]: rejects descriptors without a CSQ value.
impl FromStr for SignalInfo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_csq(trim(s)) {
            Some(_) => Ok(parse_signal(s)),
            None => Err(Error::UnparsableSignal(s.to_string())),
        }
    }
}
