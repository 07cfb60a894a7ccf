//! Per-stream flow control.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::Sender;

use bytes::Bytes;
use tracing::warn;

use crate::frame::{DataFrame, Frame, MAX_DATA_SIZE, StreamId, WindowUpdateFrame};

/// Largest legal flow control window (2^31 - 1).
const MAX_WINDOW: i64 = i32::MAX as i64;

/// Flow control errors.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(
        "window update of {delta} on stream {stream_id} would overflow the send window ({window})"
    )]
    WindowOverflow {
        stream_id: u32,
        window: i32,
        delta: u32,
    },
}

/// Credit-based flow control for one stream.
///
/// Every outbound DATA payload byte is charged against a signed send
/// window; WINDOW_UPDATE from the peer replenishes it. Writes never
/// block: bytes that do not fit the window are parked in a FIFO pending
/// buffer and drained as credit arrives, so a handler's `write` call
/// always accepts the full buffer.
pub struct FlowController {
    stream_id: StreamId,
    send_window: i32,
    recv_window: i32,
    initial_recv_window: i32,
    /// Bytes received since the last WINDOW_UPDATE we issued.
    consumed: u32,
    paused: bool,
    pending: VecDeque<Bytes>,
    output: Option<Sender<Frame>>,
}

impl FlowController {
    pub fn new(stream_id: StreamId, initial_window_size: u32, output: Sender<Frame>) -> Self {
        Self {
            stream_id,
            send_window: initial_window_size as i32,
            recv_window: initial_window_size as i32,
            initial_recv_window: initial_window_size as i32,
            consumed: 0,
            paused: false,
            pending: VecDeque::new(),
            output: Some(output),
        }
    }

    /// Get the current send window. Negative once `flush` has oversent.
    pub fn send_window(&self) -> i32 {
        self.send_window
    }

    /// Get the current receive window.
    pub fn recv_window(&self) -> i32 {
        self.recv_window
    }

    /// Check whether bytes are parked awaiting credit.
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Submit response bytes for transmission.
    ///
    /// The payload is chunked into DATA frames of at most
    /// [`MAX_DATA_SIZE`]. Whatever the send window cannot cover is
    /// buffered, so on success `n` always equals the payload length:
    /// buffered bytes count as written and hit the wire when the peer
    /// grants credit.
    pub fn write(&mut self, data: Bytes) -> io::Result<usize> {
        if self.output.is_none() {
            return Err(io::Error::other("stream already closed"));
        }

        let len = data.len();
        let mut offset = 0;
        while offset < len {
            let end = (offset + MAX_DATA_SIZE).min(len);
            self.submit(data.slice(offset..end))?;
            offset = end;
        }
        Ok(len)
    }

    fn submit(&mut self, chunk: Bytes) -> io::Result<()> {
        if self.paused {
            self.pending.push_back(chunk);
            return Ok(());
        }

        let window = self.send_window.max(0) as usize;
        if window >= chunk.len() {
            self.transmit(chunk)
        } else {
            if window > 0 {
                let rest = chunk.slice(window..);
                self.transmit(chunk.slice(..window))?;
                self.pending.push_back(rest);
            } else {
                self.pending.push_back(chunk);
            }
            self.paused = true;
            Ok(())
        }
    }

    fn transmit(&mut self, data: Bytes) -> io::Result<()> {
        self.send_window -= data.len() as i32;
        self.send(Frame::Data(DataFrame {
            stream_id: self.stream_id,
            fin: false,
            data,
        }))
    }

    fn send(&self, frame: Frame) -> io::Result<()> {
        match &self.output {
            Some(output) => output
                .send(frame)
                .map_err(|_| io::Error::other("stream already closed")),
            None => Err(io::Error::other("stream already closed")),
        }
    }

    /// Record payload bytes received from the peer.
    ///
    /// Issues a WINDOW_UPDATE once the peer has consumed at least half
    /// the initial receive window.
    pub fn receive(&mut self, len: usize) {
        self.recv_window -= len as i32;
        self.consumed = self.consumed.saturating_add(len as u32);

        if i64::from(self.consumed) >= i64::from(self.initial_recv_window) / 2 {
            let delta = self.consumed;
            self.recv_window += delta as i32;
            self.consumed = 0;
            let _ = self.send(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: self.stream_id,
                delta,
            }));
        }
    }

    /// Apply a WINDOW_UPDATE from the peer.
    ///
    /// Fails without mutating anything if the new window would exceed
    /// 2^31 - 1. On success, drains as much of the pending buffer as
    /// the new credit covers; `paused` clears once the buffer empties.
    pub fn update_window(&mut self, delta: u32) -> Result<(), FlowError> {
        if i64::from(self.send_window) + i64::from(delta) > MAX_WINDOW {
            return Err(FlowError::WindowOverflow {
                stream_id: self.stream_id.value(),
                window: self.send_window,
                delta,
            });
        }

        self.send_window += delta as i32;
        if self.paused {
            self.drain();
        }
        Ok(())
    }

    fn drain(&mut self) {
        while self.send_window > 0 {
            let Some(chunk) = self.pending.pop_front() else {
                break;
            };
            let window = self.send_window as usize;
            if chunk.len() <= window {
                let _ = self.transmit(chunk);
            } else {
                let rest = chunk.slice(window..);
                let _ = self.transmit(chunk.slice(..window));
                self.pending.push_front(rest);
            }
        }
        if self.pending.is_empty() {
            self.paused = false;
        }
    }

    /// Unconditionally transmit everything still pending.
    ///
    /// Used once at stream shutdown when the peer is still open but has
    /// not granted enough credit; the send window may go negative.
    pub fn flush(&mut self) {
        while let Some(chunk) = self.pending.pop_front() {
            let _ = self.transmit(chunk);
        }
        self.paused = false;

        if self.send_window < 0 {
            warn!(
                stream_id = self.stream_id.value(),
                deficit = -i64::from(self.send_window),
                "flushed response data past the peer's receive window"
            );
        }
    }

    /// Drop buffered data and the output handle.
    pub fn close(&mut self) {
        self.pending.clear();
        self.output = None;
    }
}
