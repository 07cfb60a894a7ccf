//! SPDY frame errors.

use std::fmt;

use crate::header::HeaderError;

/// RST_STREAM status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    /// Generic protocol violation.
    ProtocolError = 1,
    /// Frame received for a stream that is not active.
    InvalidStream = 2,
    /// Stream refused before any processing.
    RefusedStream = 3,
    /// SPDY version not supported.
    UnsupportedVersion = 4,
    /// Stream no longer needed.
    Cancel = 5,
    /// Implementation fault.
    InternalError = 6,
    /// Flow control limits violated.
    FlowControlError = 7,
    /// Stream ID already in use.
    StreamInUse = 8,
    /// Frame received for an already half-closed stream.
    StreamAlreadyClosed = 9,
    /// Invalid client certificate slot.
    InvalidCredentials = 10,
    /// Frame exceeded the receiver's limits.
    FrameTooLarge = 11,
}

impl StatusCode {
    pub fn from_u32(code: u32) -> Self {
        match code {
            1 => StatusCode::ProtocolError,
            2 => StatusCode::InvalidStream,
            3 => StatusCode::RefusedStream,
            4 => StatusCode::UnsupportedVersion,
            5 => StatusCode::Cancel,
            6 => StatusCode::InternalError,
            7 => StatusCode::FlowControlError,
            8 => StatusCode::StreamInUse,
            9 => StatusCode::StreamAlreadyClosed,
            10 => StatusCode::InvalidCredentials,
            11 => StatusCode::FrameTooLarge,
            // Unknown status codes are treated as INTERNAL_ERROR
            _ => StatusCode::InternalError,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::ProtocolError => write!(f, "PROTOCOL_ERROR"),
            StatusCode::InvalidStream => write!(f, "INVALID_STREAM"),
            StatusCode::RefusedStream => write!(f, "REFUSED_STREAM"),
            StatusCode::UnsupportedVersion => write!(f, "UNSUPPORTED_VERSION"),
            StatusCode::Cancel => write!(f, "CANCEL"),
            StatusCode::InternalError => write!(f, "INTERNAL_ERROR"),
            StatusCode::FlowControlError => write!(f, "FLOW_CONTROL_ERROR"),
            StatusCode::StreamInUse => write!(f, "STREAM_IN_USE"),
            StatusCode::StreamAlreadyClosed => write!(f, "STREAM_ALREADY_CLOSED"),
            StatusCode::InvalidCredentials => write!(f, "INVALID_CREDENTIALS"),
            StatusCode::FrameTooLarge => write!(f, "FRAME_TOO_LARGE"),
        }
    }
}

/// GOAWAY status codes.
pub mod goaway_status {
    /// Normal session teardown.
    pub const OK: u32 = 0;
    /// Session-level protocol violation.
    pub const PROTOCOL_ERROR: u32 = 1;
    /// Implementation fault.
    pub const INTERNAL_ERROR: u32 = 2;
}

/// Frame parsing/encoding errors.
#[derive(Debug)]
pub enum FrameError {
    /// Control frame carried a version other than 3.
    UnsupportedVersion { version: u16 },
    /// Control frame type is not defined by SPDY/3.
    UnknownFrameType { frame_type: u16 },
    /// Flags outside the frame's valid set.
    InvalidFlags { frame: &'static str, flags: u8 },
    /// Frame exceeds maximum allowed size.
    FrameTooLarge { size: u32, max: u32 },
    /// Invalid frame payload length.
    InvalidPayloadLength {
        frame: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Stream frame addressed to the reserved stream zero.
    StreamIdZero { frame: &'static str },
    /// Stream ID has the reserved high bit set.
    StreamIdInvalid { stream_id: u32 },
    /// Header block failed to compress or decompress.
    HeaderBlock(HeaderError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::UnsupportedVersion { version } => {
                write!(f, "unsupported SPDY version {}", version)
            }
            FrameError::UnknownFrameType { frame_type } => {
                write!(f, "unknown control frame type {}", frame_type)
            }
            FrameError::InvalidFlags { frame, flags } => {
                write!(f, "invalid flags 0x{:02x} for {} frame", flags, frame)
            }
            FrameError::FrameTooLarge { size, max } => {
                write!(f, "frame size {} exceeds maximum {}", size, max)
            }
            FrameError::InvalidPayloadLength {
                frame,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "{} frame expected {} payload bytes, got {}",
                    frame, expected, actual
                )
            }
            FrameError::StreamIdZero { frame } => {
                write!(f, "{} frame addressed to stream 0", frame)
            }
            FrameError::StreamIdInvalid { stream_id } => {
                write!(f, "stream ID 0x{:08x} has the reserved bit set", stream_id)
            }
            FrameError::HeaderBlock(e) => {
                write!(f, "header block: {}", e)
            }
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::HeaderBlock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HeaderError> for FrameError {
    fn from(e: HeaderError) -> Self {
        FrameError::HeaderBlock(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_from_u32() {
        assert_eq!(StatusCode::from_u32(1), StatusCode::ProtocolError);
        assert_eq!(StatusCode::from_u32(2), StatusCode::InvalidStream);
        assert_eq!(StatusCode::from_u32(3), StatusCode::RefusedStream);
        assert_eq!(StatusCode::from_u32(4), StatusCode::UnsupportedVersion);
        assert_eq!(StatusCode::from_u32(5), StatusCode::Cancel);
        assert_eq!(StatusCode::from_u32(6), StatusCode::InternalError);
        assert_eq!(StatusCode::from_u32(7), StatusCode::FlowControlError);
        assert_eq!(StatusCode::from_u32(8), StatusCode::StreamInUse);
        assert_eq!(StatusCode::from_u32(9), StatusCode::StreamAlreadyClosed);
        assert_eq!(StatusCode::from_u32(10), StatusCode::InvalidCredentials);
        assert_eq!(StatusCode::from_u32(11), StatusCode::FrameTooLarge);
    }

    #[test]
    fn test_status_code_from_u32_unknown() {
        // Unknown codes map to InternalError
        assert_eq!(StatusCode::from_u32(0), StatusCode::InternalError);
        assert_eq!(StatusCode::from_u32(12), StatusCode::InternalError);
        assert_eq!(StatusCode::from_u32(u32::MAX), StatusCode::InternalError);
    }

    #[test]
    fn test_status_code_roundtrip() {
        let codes = [
            StatusCode::ProtocolError,
            StatusCode::InvalidStream,
            StatusCode::RefusedStream,
            StatusCode::UnsupportedVersion,
            StatusCode::Cancel,
            StatusCode::InternalError,
            StatusCode::FlowControlError,
            StatusCode::StreamInUse,
            StatusCode::StreamAlreadyClosed,
            StatusCode::InvalidCredentials,
            StatusCode::FrameTooLarge,
        ];

        for code in codes {
            assert_eq!(StatusCode::from_u32(code.to_u32()), code);
        }
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(format!("{}", StatusCode::ProtocolError), "PROTOCOL_ERROR");
        assert_eq!(
            format!("{}", StatusCode::FlowControlError),
            "FLOW_CONTROL_ERROR"
        );
        assert_eq!(
            format!("{}", StatusCode::StreamAlreadyClosed),
            "STREAM_ALREADY_CLOSED"
        );
    }

    #[test]
    fn test_frame_error_display() {
        assert_eq!(
            format!("{}", FrameError::UnsupportedVersion { version: 2 }),
            "unsupported SPDY version 2"
        );
        assert_eq!(
            format!("{}", FrameError::UnknownFrameType { frame_type: 5 }),
            "unknown control frame type 5"
        );
        assert_eq!(
            format!(
                "{}",
                FrameError::InvalidFlags {
                    frame: "RST_STREAM",
                    flags: 0x01
                }
            ),
            "invalid flags 0x01 for RST_STREAM frame"
        );
        assert_eq!(
            format!(
                "{}",
                FrameError::FrameTooLarge {
                    size: 20_000_000,
                    max: 16_777_215
                }
            ),
            "frame size 20000000 exceeds maximum 16777215"
        );
        assert_eq!(
            format!(
                "{}",
                FrameError::InvalidPayloadLength {
                    frame: "PING",
                    expected: 4,
                    actual: 6
                }
            ),
            "PING frame expected 4 payload bytes, got 6"
        );
        assert_eq!(
            format!("{}", FrameError::StreamIdZero { frame: "SYN_STREAM" }),
            "SYN_STREAM frame addressed to stream 0"
        );
        assert_eq!(
            format!(
                "{}",
                FrameError::StreamIdInvalid {
                    stream_id: 0x8000_0001
                }
            ),
            "stream ID 0x80000001 has the reserved bit set"
        );
    }

    #[test]
    fn test_frame_error_is_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<FrameError>();
    }
}
