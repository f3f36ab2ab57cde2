#![cfg_attr(docsrs, feature(doc_cfg))]
//! # powerbank_lib
//!
//! This crate decodes the binary telemetry packets sent by powerbank rental
//! cabinets: inventory snapshots (check and upload), pop-up and return
//! outcomes, and health-check heartbeats carrying the cellular signal.
//!
//! The library is a pure codec. It performs no I/O; transports hand it byte
//! buffers and get typed records back.
//!
//! ```
//! use powerbank_lib::{dispatch, Record};
//!
//! let raw = [
//!     0xA8, 0x00, 0x0C, 0x31, 0x10, 0x05, 0x8E, 0x17, 0x08, 0x01, 0x00, 0x5A,
//! ];
//! match dispatch(&raw).unwrap() {
//!     Record::Popup(popup) => assert_eq!(popup.status_tag(), "popup-successful"),
//!     other => panic!("unexpected record {other:?}"),
//! }
//! ```
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the
//!   `powerbank` command-line tool.
//! - `serde`: Enables `serde` support for serializing/deserializing records and
//!   the protocol configuration.
//! - `bin-dependencies`: Enables all features required by the `powerbank`
//!   binary executable (`serde` plus the MQTT, CLI and logging crates).

/// Contains error types for the library.
mod error;
/// Packet framing, protocol configuration and the command dispatcher.
pub mod protocol;
/// Status code tables for holes, pop-up and return outcomes.
pub mod status;
/// Cellular signal descriptor parsing and classification.
pub mod signal;
/// Inventory packets: control boards and their holes.
pub mod cabinet;
/// Pop-up and return outcome packets.
pub mod battery;
/// Health-check packets.
pub mod heartbeat;

pub use error::{Error, Result};

pub use battery::{PopupResponse, ReturnResponse};
pub use cabinet::{CheckResponse, ControlBoard, Hole, UploadResponse};
pub use heartbeat::HealthCheckResponse;
pub use protocol::{
    decode_as, dispatch, dispatch_with, BoardLayout, Header, LengthSemantics, Packet, PacketKind,
    ProtocolConfig, Record,
};
pub use signal::{parse_signal, signal_bars, SignalInfo, SignalQuality};
pub use status::{CodeSpace, StatusTag};
