//! Per-stream engine: state tracking, flow control, and the response
//! stream that drives a handler.

mod flow;
mod response;
mod state;

pub use flow::{FlowController, FlowError};
pub use response::{HeadersMut, ResponseStream};
pub use state::StreamState;

use std::sync::Arc;

use crate::connection::Conn;
use crate::frame::{Frame, Priority, StreamId};
use crate::sync::Signal;

/// Errors surfaced by inbound frame dispatch.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("unexpected {frame} frame on stream {stream_id}")]
    UnexpectedFrame {
        stream_id: u32,
        frame: &'static str,
    },
}

/// A single multiplexed stream.
///
/// The connection's reader dispatches inbound frames through
/// `receive_frame`; a dedicated worker drives `run` to completion.
pub trait Stream: Send + Sync {
    /// The connection this stream belongs to.
    fn conn(&self) -> &Arc<Conn>;

    fn stream_id(&self) -> StreamId;

    fn priority(&self) -> Priority;

    /// Snapshot of the half-close automaton.
    fn state(&self) -> StreamState;

    /// Dispatch an inbound frame addressed to this stream.
    fn receive_frame(&self, frame: Frame) -> Result<(), StreamError>;

    /// Drive the stream: wait for the request to complete, invoke the
    /// handler, finalise the response, and half-close the local side.
    fn run(&self);

    /// The connection-wide stop signal.
    fn close_notify(&self) -> Arc<Signal>;

    /// Tear the stream down. Idempotent.
    fn close(&self);
}
