//! SPDY/3 frame types and parsing.
//!
//! Control frames share an 8-byte header:
//! ```text
//! +----------------------------------+
//! |C|  Version (15)  |   Type (16)   |
//! +----------------------------------+
//! |  Flags (8)  |    Length (24)     |
//! +----------------------------------+
//! |               Data             ...
//! +----------------------------------+
//! ```
//! Data frames reuse the same layout with the control bit clear and the
//! stream identifier where control frames carry the version and type.
//! Header blocks inside `SYN_STREAM`, `SYN_REPLY`, and `HEADERS` are
//! zlib-compressed with the SPDY preset dictionary; the decoder and
//! encoder each own one zlib stream per connection direction.

mod decode;
mod encode;
mod error;
mod types;

pub use decode::FrameDecoder;
pub use encode::FrameEncoder;
pub use error::{FrameError, StatusCode, goaway_status};
pub use types::*;

/// Protocol version carried in every control frame header. SPDY/3.1
/// keeps version 3 on the wire.
pub const PROTOCOL_VERSION: u16 = 3;

/// Maximum frame payload size allowed by the protocol (2^24 - 1).
pub const MAX_FRAME_SIZE: u32 = 16_777_215;

/// Largest DATA payload the engine emits in a single frame (4 KiB).
pub const MAX_DATA_SIZE: usize = 4_096;

/// Control and data frame headers are both 8 bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Default per-stream flow control window.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_536;

/// Default cap on concurrently active streams.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;

/// SYN_STREAM carries 10 fixed payload bytes before the header block.
pub(crate) const SYN_STREAM_FIXED_LEN: usize = 10;

/// SYN_REPLY and HEADERS carry 4 fixed payload bytes before the block.
pub(crate) const HEADER_FRAME_FIXED_LEN: usize = 4;
