//! Status tag and description lookups for the three state-code spaces.
//!
//! Hole, pop-up and return states are separate code spaces. The pop-up and
//! return spaces reuse numeric values with different meanings, so every lookup
//! names the space it reads from. Every code resolves to something: unmapped
//! codes fall back to [`StatusTag::UNKNOWN`] and [`UNKNOWN_DESCRIPTION`].

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const UNKNOWN_DESCRIPTION: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CodeSpace {
    /// Slot state reported per hole in check and upload packets.
    Hole,
    /// Outcome of a pop-up (rent) command.
    Popup,
    /// Outcome of a battery return.
    Return,
}

/// Machine-readable status, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusTag(&'static str);

impl StatusTag {
    pub const UNKNOWN: StatusTag = StatusTag("unknown-error");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl PartialEq<&str> for StatusTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(feature = "serde")]
impl Serialize for StatusTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: u8,
    pub tag: &'static str,
    pub description: &'static str,
}

const fn entry(code: u8, tag: &'static str, description: &'static str) -> StatusEntry {
    StatusEntry {
        code,
        tag,
        description,
    }
}

// Tables are sorted by code; `lookup` relies on it.
static HOLE_STATES: [StatusEntry; 11] = [
    entry(0x00, "no-power-supply", "No mobile power supply"),
    entry(0x01, "normal", "Power bank is normal"),
    entry(0x02, "charging-abnormality", "Charging abnormality"),
    entry(0x03, "communication-exception", "Communication exception"),
    entry(0x04, "kabao-damaged", "KaBao/Damaged"),
    entry(0x05, "key-force-release", "The key is forcibly released"),
    entry(
        0x06,
        "solenoid-valve-not-return",
        "The solenoid valve did not return to the position when returned",
    ),
    entry(0x07, "reserved", "Reserved"),
    entry(
        0x08,
        "anti-theft-protocol-communication-failed",
        "Anti-theft protocol communication failed",
    ),
    entry(0x09, "typec-short-circuit", "Typec short circuit"),
    entry(
        0x0A,
        "return-failed-battery-does-not-pop-out",
        "Return failed, battery does not pop out",
    ),
];

static POPUP_STATES: [StatusEntry; 16] = [
    entry(0x00, "popup-failed", "Pop-up failed"),
    entry(0x01, "popup-successful", "Pop-up successful"),
    entry(
        0x02,
        "power-supply-charging-abnormally",
        "Power-supply charging abnormally",
    ),
    entry(
        0x03,
        "communication-abnormality-first-return-failed",
        "Communication abnormality (first return failed)",
    ),
    entry(
        0x04,
        "slot-cannot-pop-out",
        "This slot cannot pop out a mobile power supply normally",
    ),
    entry(0x05, "slot-forcibly-released", "Slot forcibly released"),
    entry(
        0x06,
        "solenoid-not-returned",
        "Solenoid valve did not return to home position",
    ),
    entry(
        0x08,
        "anti-theft-comm-failed",
        "Anti-theft protocol communication failed",
    ),
    entry(0x11, "failed-to-obtain-sn", "Failed to obtain SN"),
    entry(
        0x12,
        "popup-complete-motor-home-sn-readable",
        "Pop-up completed; motor is home and SN can be read",
    ),
    entry(
        0x13,
        "failed-to-obtain-traceback",
        "Failed to obtain traceback information",
    ),
    entry(
        0x14,
        "battery-lock-command-failed",
        "Battery-lock command failed",
    ),
    entry(
        0x21,
        "sn-acquisition-and-motor-failed",
        "Failed to obtain SN and motor action failed",
    ),
    entry(
        0x22,
        "info-acquisition-and-motor-failed",
        "Failed to obtain all information and motor operation failed",
    ),
    entry(
        0x23,
        "battery-lock-and-motor-failed",
        "Battery-lock command failed and motor action failed",
    ),
    entry(
        0x24,
        "anti-theft-switch-detection-failed",
        "Anti-theft-switch detection failed",
    ),
];

static RETURN_STATES: [StatusEntry; 10] = [
    entry(0x00, "return-failed", "Return failed"),
    entry(0x01, "return-successful", "Return successful"),
    entry(0x11, "failed-to-obtain-sn", "Failed to obtain SN"),
    entry(
        0x12,
        "failed-to-obtain-voltage-temperature-or-other-information",
        "Failed to obtain voltage, temperature, or other information",
    ),
    entry(
        0x13,
        "failed-to-obtain-software-and-hardware-version-information",
        "Failed to obtain software and hardware version information",
    ),
    entry(
        0x14,
        "battery-lock-command-failed",
        "Battery-lock command failed",
    ),
    entry(
        0x21,
        "failed-to-obtain-sn-and-motor-action-failed",
        "Failed to obtain SN, and motor action failed",
    ),
    entry(
        0x22,
        "failed-to-obtain-voltage-temperature-or-other-information-and-motor-action-failed",
        "Failed to obtain voltage, temperature, or other information, and motor action failed",
    ),
    entry(
        0x23,
        "battery-lock-command-failed-and-motor-action-failed",
        "Battery-lock command failed, and motor action failed",
    ),
    entry(
        0x24,
        "anti-theft-switch-detection-failed",
        "Anti-theft switch detection failed (within 5 minutes, an 0x28 self-test command will be reported)",
    ),
];

impl CodeSpace {
    pub fn table(self) -> &'static [StatusEntry] {
        match self {
            CodeSpace::Hole => &HOLE_STATES,
            CodeSpace::Popup => &POPUP_STATES,
            CodeSpace::Return => &RETURN_STATES,
        }
    }
}

/// Returns the table entry for `code`, or `None` when the code is unmapped.
pub fn lookup(space: CodeSpace, code: u8) -> Option<&'static StatusEntry> {
    let table = space.table();
    table
        .binary_search_by_key(&code, |entry| entry.code)
        .ok()
        .map(|index| &table[index])
}

pub fn status_tag(space: CodeSpace, code: u8) -> StatusTag {
    lookup(space, code).map_or(StatusTag::UNKNOWN, |entry| StatusTag(entry.tag))
}

pub fn description(space: CodeSpace, code: u8) -> &'static str {
    lookup(space, code).map_or(UNKNOWN_DESCRIPTION, |entry| entry.description)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACES: [CodeSpace; 3] = [CodeSpace::Hole, CodeSpace::Popup, CodeSpace::Return];

    #[test]
    fn test_tables_sorted_and_unique() {
        for space in SPACES {
            let codes: Vec<u8> = space.table().iter().map(|e| e.code).collect();
            assert!(
                codes.windows(2).all(|w| w[0] < w[1]),
                "{space:?} table is not strictly sorted: {codes:02X?}"
            );
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(status_tag(CodeSpace::Hole, 0x01), "normal");
        assert_eq!(status_tag(CodeSpace::Popup, 0x01), "popup-successful");
        assert_eq!(
            status_tag(CodeSpace::Return, 0x24),
            "anti-theft-switch-detection-failed"
        );
        assert_eq!(description(CodeSpace::Hole, 0x09), "Typec short circuit");
    }

    #[test]
    fn test_code_spaces_are_independent() {
        // 0x12 exists in both outcome spaces with different meanings.
        assert_ne!(
            status_tag(CodeSpace::Popup, 0x12),
            status_tag(CodeSpace::Return, 0x12)
        );
        assert_eq!(status_tag(CodeSpace::Popup, 0x00), "popup-failed");
        assert_eq!(status_tag(CodeSpace::Return, 0x00), "return-failed");
        assert_eq!(status_tag(CodeSpace::Hole, 0x00), "no-power-supply");
        // Only the popup space maps 0x02.
        assert_eq!(status_tag(CodeSpace::Return, 0x02), StatusTag::UNKNOWN);
    }

    #[test]
    fn test_every_code_resolves() {
        for space in SPACES {
            for code in 0..=u8::MAX {
                let tag = status_tag(space, code);
                let text = description(space, code);
                assert!(!tag.as_str().is_empty());
                assert!(!text.is_empty());
                if lookup(space, code).is_none() {
                    assert_eq!(tag, StatusTag::UNKNOWN);
                    assert_eq!(text, UNKNOWN_DESCRIPTION);
                }
            }
        }
    }

    #[test]
    fn test_unmapped_codes() {
        assert_eq!(status_tag(CodeSpace::Hole, 0x0B), "unknown-error");
        assert_eq!(status_tag(CodeSpace::Popup, 0x07), "unknown-error");
        assert_eq!(description(CodeSpace::Return, 0xFF), "Unknown error");
    }
}
