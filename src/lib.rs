//! spdy - server-side SPDY/3 stream engine.
//!
//! This crate implements the per-stream state machine that bridges a
//! multiplexed SPDY/3 (or SPDY/3.1) frame stream with ordinary HTTP
//! handler invocations: it materialises a request from inbound
//! `SYN_STREAM` and `DATA` frames, drives a user-supplied handler whose
//! writes are chunked and flow controlled into outbound frames, and
//! maintains the half-close automaton on both endpoints of the stream.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `frame`: SPDY frame types, encoding, and decoding
//! - `header`: header maps and zlib header-block compression
//! - `stream`: stream state, flow control, and the response stream
//! - `connection`: the engine's view of the owning connection
//!
//! Transport setup, the TCP accept loop, and the connection-level
//! multiplexer and writer are the embedding server's responsibility;
//! the engine reaches them through [`Conn`].

pub mod connection;
pub mod frame;
pub mod header;
pub mod http;
pub mod stream;
pub mod sync;

// Re-export commonly used types
pub use frame::{
    DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_CONCURRENT_STREAMS, DataFrame, FRAME_HEADER_SIZE,
    Frame, FrameDecoder, FrameEncoder, FrameError, GoAwayFrame, HeadersFrame, MAX_DATA_SIZE,
    MAX_FRAME_SIZE, PingFrame, Priority, RstStreamFrame, Setting, SettingId, SettingsFrame,
    StatusCode, StreamId, SynReplyFrame, SynStreamFrame, Version, WindowUpdateFrame,
};

pub use connection::{Conn, ConnectionSettings};
pub use header::Headers;
pub use http::{Handler, Request};
pub use stream::{FlowController, FlowError, ResponseStream, Stream, StreamError, StreamState};
pub use sync::Signal;
