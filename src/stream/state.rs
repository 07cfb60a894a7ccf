//! Stream half-close state tracking.

/// Stream state: which endpoints may still send.
///
/// Both half-closes are idempotent, and either order of the two reaches
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Both sides open.
    #[default]
    Open,
    /// We have sent FIN; the peer may still send.
    HalfClosedLocal,
    /// The peer has sent FIN; we may still send.
    HalfClosedRemote,
    /// Terminal.
    Closed,
}

impl StreamState {
    pub fn new() -> Self {
        StreamState::Open
    }

    /// Record that this side sent FIN.
    pub fn close_local(&mut self) {
        *self = match *self {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    /// Record that the peer sent FIN.
    pub fn close_remote(&mut self) {
        *self = match *self {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        };
    }

    /// Force the terminal state.
    pub fn close(&mut self) {
        *self = StreamState::Closed;
    }

    /// Check if this side may still send.
    pub fn is_open_local(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the peer may still send.
    pub fn is_open_remote(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    pub fn is_closed_local(self) -> bool {
        !self.is_open_local()
    }

    pub fn is_closed_remote(self) -> bool {
        !self.is_open_remote()
    }

    pub fn is_closed(self) -> bool {
        matches!(self, StreamState::Closed)
    }
}
