//! Amplifier error types

use contracts::ContractError;
use thiserror::Error;

use crate::codec::RESPONSE_FAILURE;

/// Render a protocol byte as character, decimal and hexadecimal
pub fn describe_byte(byte: u8) -> String {
    format!("{:?} ({} / {:#04x})", char::from(byte), byte, byte)
}

/// The amplifier answered outside the documented response alphabet
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// `'F'` response
    #[error(
        "amplifier reported failure for {command}: got {}",
        describe_byte(RESPONSE_FAILURE)
    )]
    AmplifierFailure { command: &'static str },

    /// Any response other than the expected success code
    #[error(
        "unexpected response to {command}: expected {}, got {}",
        describe_byte(*expected),
        describe_byte(*actual)
    )]
    UnexpectedResponse {
        command: &'static str,
        expected: u8,
        actual: u8,
    },
}

/// Packet decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unexpected command byte {actual:#04x}, expected {expected:#04x}")]
    UnexpectedCommand { expected: u8, actual: u8 },

    #[error("unexpected dataSize {actual}, expected {expected}")]
    DataSize { expected: u16, actual: u16 },
}

/// Amplifier link errors
///
/// Every variant is fatal to the link it came from.
#[derive(Debug, Error)]
pub enum AmplifierError {
    /// TCP session could not be established
    #[error("cannot connect to amplifier at {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Stream failure (disconnect, malformed stream)
    #[error("amplifier link i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Link was closed or terminated by an earlier error
    #[error("amplifier link is closed")]
    Closed,
}

impl From<AmplifierError> for ContractError {
    fn from(err: AmplifierError) -> Self {
        match err {
            AmplifierError::Connection { address, source } => {
                ContractError::amplifier_connection(address, source.to_string())
            }
            AmplifierError::Protocol(e) => ContractError::AmplifierProtocol {
                message: e.to_string(),
            },
            AmplifierError::Io(e) => ContractError::Io(e),
            AmplifierError::Closed => ContractError::AmplifierProtocol {
                message: "link is closed".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_byte_has_decimal_and_hex() {
        assert_eq!(describe_byte(b'Q'), "'Q' (81 / 0x51)");
        assert_eq!(describe_byte(0), "'\\0' (0 / 0x00)");
    }

    #[test]
    fn test_unexpected_response_message() {
        let err = ProtocolError::UnexpectedResponse {
            command: "trigger",
            expected: b'Z',
            actual: b'?',
        };
        let msg = err.to_string();
        assert!(msg.contains("90 / 0x5a"), "{msg}");
        assert!(msg.contains("63 / 0x3f"), "{msg}");
    }

    #[test]
    fn test_failure_message_shows_byte() {
        let err = ProtocolError::AmplifierFailure { command: "trigger" };
        assert_eq!(
            err.to_string(),
            "amplifier reported failure for trigger: got 'F' (70 / 0x46)"
        );
    }
}
