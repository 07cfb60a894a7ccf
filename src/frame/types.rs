//! SPDY frame type definitions.

use std::fmt;

use bytes::Bytes;

use super::error::StatusCode;
use crate::header::Headers;

/// SPDY dialect spoken on a connection.
///
/// Both dialects put version 3 on the wire. SPDY/3.1 drops the
/// credential slot from `SYN_STREAM` (the byte is written as 0) and
/// moves flow control partly to the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    Spdy3,
    Spdy31,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Spdy3 => write!(f, "3"),
            Version::Spdy31 => write!(f, "3.1"),
        }
    }
}

/// SPDY control frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ControlType {
    SynStream = 1,
    SynReply = 2,
    RstStream = 3,
    Settings = 4,
    Ping = 6,
    GoAway = 7,
    Headers = 8,
    WindowUpdate = 9,
}

impl ControlType {
    /// Try to convert a wire value to a control frame type.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ControlType::SynStream),
            2 => Some(ControlType::SynReply),
            3 => Some(ControlType::RstStream),
            4 => Some(ControlType::Settings),
            6 => Some(ControlType::Ping),
            7 => Some(ControlType::GoAway),
            8 => Some(ControlType::Headers),
            9 => Some(ControlType::WindowUpdate),
            _ => None,
        }
    }
}

/// Frame flags.
pub mod flags {
    /// The sender will emit no more frames on this stream.
    pub const FIN: u8 = 0x01;
    /// SYN_STREAM: the stream carries data in one direction only.
    pub const UNIDIRECTIONAL: u8 = 0x02;
    /// SETTINGS: clear previously persisted settings.
    pub const CLEAR_SETTINGS: u8 = 0x01;
    /// SETTINGS entry: the receiver should persist this value.
    pub const SETTINGS_PERSIST_VALUE: u8 = 0x01;
    /// SETTINGS entry: this value was previously persisted.
    pub const SETTINGS_PERSISTED: u8 = 0x02;
}

/// Stream identifier (31 bits, high bit reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Stream zero is reserved and never names a stream.
    pub const ZERO: StreamId = StreamId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        StreamId(id)
    }

    /// Get the raw stream ID value.
    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Valid iff the reserved high bit is clear.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }

    /// Check if this is a client-initiated stream (odd numbers).
    #[inline]
    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId::new(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stream priority: 3 bits, 0 most urgent, 7 least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Priority(u8);

impl Priority {
    pub fn new(priority: u8) -> Self {
        Priority(priority & 0x07)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Priority travels in the high 3 bits of its wire byte.
    pub fn from_wire(byte: u8) -> Self {
        Priority(byte >> 5)
    }

    pub fn to_wire(self) -> u8 {
        self.0 << 5
    }
}

/// Parsed SPDY frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    Headers(HeadersFrame),
    WindowUpdate(WindowUpdateFrame),
    Data(DataFrame),
}

impl Frame {
    /// Get the stream this frame addresses; zero for session frames.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::SynStream(f) => f.stream_id,
            Frame::SynReply(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Settings(_) => StreamId::ZERO,
            Frame::Ping(_) => StreamId::ZERO,
            Frame::GoAway(_) => StreamId::ZERO,
            Frame::Headers(f) => f.stream_id,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Data(f) => f.stream_id,
        }
    }

    /// Wire name of the frame, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::SynStream(_) => "SYN_STREAM",
            Frame::SynReply(_) => "SYN_REPLY",
            Frame::RstStream(_) => "RST_STREAM",
            Frame::Settings(_) => "SETTINGS",
            Frame::Ping(_) => "PING",
            Frame::GoAway(_) => "GOAWAY",
            Frame::Headers(_) => "HEADERS",
            Frame::WindowUpdate(_) => "WINDOW_UPDATE",
            Frame::Data(_) => "DATA",
        }
    }
}

/// SYN_STREAM frame (type=1): opens a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    pub stream_id: StreamId,
    /// Stream this one is associated with; zero for independent streams.
    pub assoc_stream_id: StreamId,
    pub priority: Priority,
    /// Credential slot. Meaningful in SPDY/3.0, reserved 0 in 3.1.
    pub slot: u8,
    pub fin: bool,
    pub unidirectional: bool,
    pub headers: Headers,
}

/// SYN_REPLY frame (type=2): response headers for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: Headers,
}

/// RST_STREAM frame (type=3): abnormal stream termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub status: StatusCode,
}

/// SETTINGS frame (type=4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub clear_settings: bool,
    pub settings: Vec<Setting>,
}

/// Individual entry in a SETTINGS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub flags: u8,
    pub id: SettingId,
    pub value: u32,
}

/// Known setting identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingId {
    UploadBandwidth,
    DownloadBandwidth,
    RoundTripTime,
    MaxConcurrentStreams,
    CurrentCwnd,
    DownloadRetransRate,
    InitialWindowSize,
    ClientCertificateVectorSize,
    /// Unknown setting ID.
    Unknown(u32),
}

impl SettingId {
    pub fn from_u32(id: u32) -> Self {
        match id {
            1 => SettingId::UploadBandwidth,
            2 => SettingId::DownloadBandwidth,
            3 => SettingId::RoundTripTime,
            4 => SettingId::MaxConcurrentStreams,
            5 => SettingId::CurrentCwnd,
            6 => SettingId::DownloadRetransRate,
            7 => SettingId::InitialWindowSize,
            8 => SettingId::ClientCertificateVectorSize,
            _ => SettingId::Unknown(id),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            SettingId::UploadBandwidth => 1,
            SettingId::DownloadBandwidth => 2,
            SettingId::RoundTripTime => 3,
            SettingId::MaxConcurrentStreams => 4,
            SettingId::CurrentCwnd => 5,
            SettingId::DownloadRetransRate => 6,
            SettingId::InitialWindowSize => 7,
            SettingId::ClientCertificateVectorSize => 8,
            SettingId::Unknown(id) => id,
        }
    }
}

/// PING frame (type=6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

/// GOAWAY frame (type=7): session teardown notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_good_stream_id: StreamId,
    pub status: u32,
}

/// HEADERS frame (type=8): additional headers for an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: Headers,
}

/// WINDOW_UPDATE frame (type=9): flow control credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub delta: u32,
}

/// DATA frame (control bit clear).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub data: Bytes,
}
