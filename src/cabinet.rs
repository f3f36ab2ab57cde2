//! Cabinet inventory packets: the reply to a check command and the
//! unsolicited upload. Both carry a run of control boards, each followed by
//! the holes (slots) it owns.
//!
//! ```text
//! +------+--------+-----+---------------------------------------+--------+
//! | 0xA8 | len(2) | cmd | board(6) hole(15) hole(15) ... board  | verify |
//! +------+--------+-----+---------------------------------------+--------+
//! ```

use crate::protocol::{
    decode_header, deci, serial_number, verify_byte, BoardLayout, Header, PacketKind,
    ProtocolConfig, HEADER_LENGTH,
};
use crate::status::{self, CodeSpace, StatusTag};
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const BOARD_HEADER_LENGTH: usize = 6;
pub const HOLE_LENGTH: usize = 15;
pub const HOLES_PER_BOARD: usize = 4;

/// Control board addresses are non-zero multiples of 0x10.
pub fn is_board_address(byte: u8) -> bool {
    byte != 0 && byte & 0x0F == 0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hole {
    pub hole_index: u8,
    pub state: u8,
    /// Amps
    pub powerbank_current: f32,
    /// Volts
    pub powerbank_voltage: f32,
    pub area: u8,
    pub powerbank_serial: String,
    /// Percent, 0-255
    pub state_of_charge: u8,
    pub temperature: u8,
    pub charge_voltage: f32,
    pub charge_current: f32,
    pub soft_version: u8,
    pub sensor: u8,
}

impl Hole {
    // `block` is exactly HOLE_LENGTH bytes.
    fn decode(block: &[u8]) -> Self {
        Self {
            hole_index: block[0],
            state: block[1],
            powerbank_current: deci(block[2]),
            powerbank_voltage: deci(block[3]),
            area: block[4],
            powerbank_serial: serial_number(&block[5..9]),
            state_of_charge: block[9],
            temperature: block[10],
            charge_voltage: deci(block[11]),
            charge_current: deci(block[12]),
            soft_version: block[13],
            sensor: block[14],
        }
    }

    pub fn status_tag(&self) -> StatusTag {
        status::status_tag(CodeSpace::Hole, self.state)
    }

    pub fn state_description(&self) -> &'static str {
        status::description(CodeSpace::Hole, self.state)
    }

    /// Area code as the character the device encodes it with.
    pub fn area_code(&self) -> char {
        char::from(self.area)
    }

    pub fn is_occupied(&self) -> bool {
        self.state != 0x00
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlBoard {
    pub control_index: u8,
    pub reserved: [u8; 2],
    pub temperature: u8,
    pub soft_version: u8,
    pub hard_version: u8,
    pub holes: Vec<Hole>,
}

impl ControlBoard {
    // `block` is exactly BOARD_HEADER_LENGTH bytes.
    fn decode_header(block: &[u8]) -> Self {
        Self {
            control_index: block[0],
            reserved: [block[1], block[2]],
            temperature: block[3],
            soft_version: block[4],
            hard_version: block[5],
            holes: Vec::new(),
        }
    }
}

fn decode_boards(buffer: &[u8], layout: BoardLayout) -> Result<Vec<ControlBoard>> {
    // Everything between the packet header and the verify byte.
    let end = buffer.len() - 1;
    let required = match layout {
        BoardLayout::Sentinel => BOARD_HEADER_LENGTH,
        BoardLayout::FixedFour => BOARD_HEADER_LENGTH + HOLES_PER_BOARD * HOLE_LENGTH,
    };
    let mut boards = Vec::new();
    let mut cursor = HEADER_LENGTH;

    while cursor < end {
        let remaining = end - cursor;
        if remaining < required {
            log::warn!(
                "Truncated control board - offset={} required={} remaining={}",
                cursor,
                required,
                remaining
            );
            return Err(Error::TruncatedBoard {
                offset: cursor,
                required,
                remaining,
            });
        }
        if !is_board_address(buffer[cursor]) {
            log::warn!(
                "Invalid control board address - offset={} address={:02X?}",
                cursor,
                buffer[cursor]
            );
            return Err(Error::InvalidBoardAddress {
                offset: cursor,
                address: buffer[cursor],
            });
        }
        let mut board = ControlBoard::decode_header(&buffer[cursor..cursor + BOARD_HEADER_LENGTH]);
        cursor += BOARD_HEADER_LENGTH;

        match layout {
            BoardLayout::Sentinel => {
                while cursor + HOLE_LENGTH <= end {
                    board
                        .holes
                        .push(Hole::decode(&buffer[cursor..cursor + HOLE_LENGTH]));
                    cursor += HOLE_LENGTH;
                    if cursor + BOARD_HEADER_LENGTH <= end && is_board_address(buffer[cursor]) {
                        break;
                    }
                }
            }
            BoardLayout::FixedFour => {
                for _ in 0..HOLES_PER_BOARD {
                    board
                        .holes
                        .push(Hole::decode(&buffer[cursor..cursor + HOLE_LENGTH]));
                    cursor += HOLE_LENGTH;
                }
            }
        }
        log::trace!(
            "Board {:02X?} with {} holes, next offset {}",
            board.control_index,
            board.holes.len(),
            cursor
        );
        boards.push(board);
    }
    Ok(boards)
}

fn decode_inventory(
    buffer: &[u8],
    kind: PacketKind,
    config: &ProtocolConfig,
) -> Result<(Header, Vec<ControlBoard>, u8)> {
    let header = decode_header(buffer, kind, config)?;
    let control_boards = decode_boards(buffer, config.board_layout)?;
    Ok((header, control_boards, verify_byte(buffer)))
}

macro_rules! inventory_packet {
    ($name:ident, $kind:expr) => {
        #[derive(Debug, Clone, PartialEq)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name {
            pub header: Header,
            pub control_boards: Vec<ControlBoard>,
            pub verify: u8,
        }

        impl $name {
            pub fn decode(buffer: &[u8], config: &ProtocolConfig) -> Result<Self> {
                let (header, control_boards, verify) = decode_inventory(buffer, $kind, config)?;
                Ok(Self {
                    header,
                    control_boards,
                    verify,
                })
            }

            /// Every hole, board by board, in wire order.
            pub fn holes(&self) -> impl Iterator<Item = &Hole> + '_ {
                self.control_boards.iter().flat_map(|board| board.holes.iter())
            }

            pub fn hole_count(&self) -> usize {
                self.control_boards.iter().map(|board| board.holes.len()).sum()
            }
        }
    };
}

inventory_packet!(CheckResponse, PacketKind::Check);
// Same layout as a check reply, sent by the device on its own.
inventory_packet!(UploadResponse, PacketKind::Upload);
