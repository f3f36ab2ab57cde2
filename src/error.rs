use thiserror::Error;

/// Decode failures reported by the packet parsers.
///
/// Every variant carries the values needed to log the failure without
/// re-parsing the buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid header: expected 0xA8, got 0x{0:02X}")]
    InvalidHeader(u8),

    #[error("invalid command: expected 0x{expected:02X}, got 0x{actual:02X}")]
    InvalidCommand { expected: u8, actual: u8 },

    #[error("length mismatch: length field declares {expected} bytes, buffer holds {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unknown command type: 0x{0:02X}")]
    UnknownCommand(u8),

    /// A control board starts at `offset` but fewer than `required` bytes
    /// remain before the verify byte.
    #[error("truncated board at offset {offset}: need {required} bytes, {remaining} remain")]
    TruncatedBoard {
        offset: usize,
        required: usize,
        remaining: usize,
    },

    /// A control board header at `offset` does not start with a board address.
    #[error("invalid control board address 0x{address:02X} at offset {offset}")]
    InvalidBoardAddress { offset: usize, address: u8 },

    #[error("unparsable signal descriptor: {0:?}")]
    UnparsableSignal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidHeader(0x5A);
        assert_eq!(err.to_string(), "invalid header: expected 0xA8, got 0x5A");

        let err = Error::TooShort {
            expected: 12,
            actual: 3,
        };
        assert!(err.to_string().contains("at least 12 bytes, got 3"));

        let err = Error::TruncatedBoard {
            offset: 70,
            required: 6,
            remaining: 2,
        };
        assert!(err.to_string().contains("offset 70"));

        let err = Error::InvalidBoardAddress {
            offset: 25,
            address: 0xAB,
        };
        assert_eq!(
            err.to_string(),
            "invalid control board address 0xAB at offset 25"
        );
    }
}
