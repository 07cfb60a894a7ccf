//! The engine's view of the owning connection.
//!
//! The stream engine sees a connection as three things: the negotiated
//! settings, a sink for outbound frames, and the connection-wide stop
//! signal. The accept loop, framer, and writer live outside this crate
//! and hand each stream a [`Conn`] handle at creation.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::frame::{DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_CONCURRENT_STREAMS, Frame, Version};
use crate::sync::Signal;

/// Settings negotiated at the connection's SETTINGS exchange.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Initial per-stream flow control window.
    pub initial_window_size: u32,
    /// Maximum number of concurrent streams.
    pub max_concurrent_streams: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
        }
    }
}

impl ConnectionSettings {
    /// Create new settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial per-stream window size.
    pub fn initial_window_size(mut self, value: u32) -> Self {
        self.initial_window_size = value;
        self
    }

    /// Set the maximum number of concurrent streams.
    pub fn max_concurrent_streams(mut self, value: u32) -> Self {
        self.max_concurrent_streams = value;
        self
    }
}

/// Handle to the connection a stream belongs to.
pub struct Conn {
    version: Version,
    settings: ConnectionSettings,
    output: Sender<Frame>,
    stop: Arc<Signal>,
}

impl Conn {
    pub fn new(version: Version, settings: ConnectionSettings, output: Sender<Frame>) -> Self {
        Self {
            version,
            settings,
            output,
            stop: Arc::new(Signal::new()),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Initial flow control window for new streams.
    pub fn initial_window_size(&self) -> u32 {
        self.settings.initial_window_size
    }

    /// The connection's outbound frame queue.
    pub fn output(&self) -> &Sender<Frame> {
        &self.output
    }

    /// The connection-wide stop signal.
    pub fn stop_signal(&self) -> &Arc<Signal> {
        &self.stop
    }

    /// Fire the stop signal. Streams observe it through `close_notify`
    /// and refuse further writes.
    pub fn shutdown(&self) {
        self.stop.fire();
    }
}
