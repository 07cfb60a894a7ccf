//! The server's response stream.
//!
//! A `ResponseStream` is created when a SYN_STREAM opens a new stream.
//! The connection's reader feeds it inbound frames through
//! `receive_frame`; a dedicated worker drives `run`, which waits for
//! the request to complete, invokes the handler, and finalises the
//! response so the peer observes exactly one FIN from this side.

use std::any::Any;
use std::io;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, Once};

use bytes::{Bytes, BytesMut};
use tracing::{error, warn};

use super::flow::FlowController;
use super::state::StreamState;
use super::{Stream, StreamError};
use crate::connection::Conn;
use crate::frame::{
    DataFrame, Frame, HeadersFrame, Priority, RstStreamFrame, StatusCode, StreamId, SynReplyFrame,
    SynStreamFrame,
};
use crate::header::Headers;
use crate::http::{Handler, Request};
use crate::sync::Signal;

/// State guarded by the stream mutex.
struct Inner {
    state: StreamState,
    flow: FlowController,
    /// Response headers pending transmission in the next header-bearing
    /// frame.
    headers: Headers,
    status: u16,
    wrote_header: bool,
    request_body: BytesMut,
    request: Option<Request>,
    handler: Option<Arc<dyn Handler>>,
    output: Option<Sender<Frame>>,
}

/// A server-side stream responding to one peer request.
pub struct ResponseStream {
    conn: Arc<Conn>,
    stream_id: StreamId,
    priority: Priority,
    unidirectional: bool,
    stop: Arc<Signal>,
    /// Fired once the full request has been received.
    ready: Signal,
    shutdown: Once,
    inner: Mutex<Inner>,
}

impl ResponseStream {
    /// Create a stream for an inbound SYN_STREAM.
    ///
    /// If the opening frame carries FIN, the request is already complete
    /// and the remote side starts half-closed.
    pub fn new(
        conn: &Arc<Conn>,
        frame: &SynStreamFrame,
        output: Sender<Frame>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let mut state = StreamState::new();
        let ready = Signal::new();
        if frame.fin {
            ready.fire();
            state.close_remote();
        }

        let flow = FlowController::new(frame.stream_id, conn.initial_window_size(), output.clone());
        let request = Request::from_syn_stream(frame);

        Self {
            conn: Arc::clone(conn),
            stream_id: frame.stream_id,
            priority: frame.priority,
            unidirectional: frame.unidirectional,
            stop: Arc::clone(conn.stop_signal()),
            ready,
            shutdown: Once::new(),
            inner: Mutex::new(Inner {
                state,
                flow,
                headers: Headers::new(),
                status: 0,
                wrote_header: false,
                request_body: BytesMut::new(),
                request: Some(request),
                handler: Some(handler),
                output: Some(output),
            }),
        }
    }

    /// A panicking handler can poison the stream mutex; teardown and
    /// diagnostics must still get through.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn conn(&self) -> &Arc<Conn> {
        &self.conn
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_unidirectional(&self) -> bool {
        self.unidirectional
    }

    /// Snapshot of the half-close automaton.
    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    /// The response status, or 0 if none has been written yet.
    pub fn status(&self) -> u16 {
        self.lock().status
    }

    /// The connection-wide stop signal, for handlers that want to
    /// abandon long work when the peer disconnects.
    pub fn close_notify(&self) -> Arc<Signal> {
        Arc::clone(&self.stop)
    }

    /// Mutable access to the pending response headers.
    ///
    /// Mutations are captured by the next header-bearing outbound frame.
    /// The guard holds the stream lock: drop it before calling `write`
    /// or `write_status`.
    pub fn headers(&self) -> HeadersMut<'_> {
        HeadersMut {
            guard: self.lock(),
        }
    }

    /// Set the response status and emit the SYN_REPLY.
    ///
    /// May be called at most once; later calls are logged and ignored.
    /// Statuses without a body (1xx, 204, 304) half-close the local side
    /// immediately, with FIN on the SYN_REPLY itself.
    pub fn write_status(&self, code: u16) {
        if self.unidirectional {
            warn!(
                stream_id = self.stream_id.value(),
                "response status written on a unidirectional stream"
            );
            return;
        }

        let mut inner = self.lock();
        if inner.wrote_header {
            warn!(
                stream_id = self.stream_id.value(),
                code, "response status written more than once"
            );
            return;
        }
        self.write_status_locked(&mut inner, code);
    }

    fn write_status_locked(&self, inner: &mut Inner, code: u16) {
        inner.wrote_header = true;
        inner.status = code;
        inner.headers.set(":status", code.to_string());
        inner.headers.set(":version", "HTTP/1.1");

        let headers = inner.headers.take();

        // These responses have no body, so close the stream now.
        let fin = code == 204 || code == 304 || (100..200).contains(&code);
        if fin {
            inner.state.close_local();
        }

        self.send_locked(
            inner,
            Frame::SynReply(SynReplyFrame {
                stream_id: self.stream_id,
                fin,
                headers,
            }),
        );
    }

    /// Send response body bytes.
    ///
    /// Writes an implicit 200 status if none has been written, flushes
    /// pending header deltas, and hands the payload to flow control.
    /// Buffered bytes count as written: `n` equals the payload length
    /// whenever the call succeeds.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.unidirectional {
            return Err(io::Error::other("stream is unidirectional"));
        }

        let mut inner = self.lock();
        if self.closed_locked(&inner) || inner.state.is_closed_local() {
            return Err(io::Error::other("stream already closed"));
        }

        // The handler may reuse its buffer; detach from it up front.
        let data = Bytes::copy_from_slice(data);

        // Default to a 200 response.
        if !inner.wrote_header {
            self.write_status_locked(&mut inner, 200);
        }

        // Send any headers set since the last header-bearing frame.
        self.flush_headers_locked(&mut inner);

        inner.flow.write(data)
    }

    /// Flush header deltas accumulated since the last header-bearing
    /// frame as a HEADERS frame.
    fn flush_headers_locked(&self, inner: &mut Inner) {
        if inner.headers.is_empty() || self.unidirectional {
            return;
        }

        let headers = inner.headers.take();
        self.send_locked(
            inner,
            Frame::Headers(HeadersFrame {
                stream_id: self.stream_id,
                fin: false,
                headers,
            }),
        );
    }

    fn send_locked(&self, inner: &mut Inner, frame: Frame) {
        if let Some(output) = &inner.output {
            let _ = output.send(frame);
        }
    }

    fn closed_locked(&self, inner: &Inner) -> bool {
        inner.output.is_none() || inner.handler.is_none() || self.stop.is_fired()
    }

    /// Dispatch an inbound frame addressed to this stream.
    pub fn receive_frame(&self, frame: Frame) -> Result<(), StreamError> {
        let mut inner = self.lock();

        match frame {
            Frame::Data(f) => {
                inner.request_body.extend_from_slice(&f.data);
                inner.flow.receive(f.data.len());
                if f.fin {
                    self.ready.fire();
                    inner.state.close_remote();
                }
                Ok(())
            }

            // A server stream should not see SYN_REPLY; treat it as a
            // header update rather than killing the stream.
            Frame::SynReply(f) => {
                inner.headers.merge(f.headers);
                if f.fin {
                    self.ready.fire();
                    inner.state.close_remote();
                }
                Ok(())
            }

            Frame::Headers(f) => {
                inner.headers.merge(f.headers);
                Ok(())
            }

            Frame::WindowUpdate(f) => {
                if let Err(e) = inner.flow.update_window(f.delta) {
                    self.send_locked(
                        &mut inner,
                        Frame::RstStream(RstStreamFrame {
                            stream_id: self.stream_id,
                            status: StatusCode::FlowControlError,
                        }),
                    );
                    inner.state.close();
                    return Err(e.into());
                }
                Ok(())
            }

            other => Err(StreamError::UnexpectedFrame {
                stream_id: self.stream_id.value(),
                frame: other.name(),
            }),
        }
    }

    /// Drive the stream to completion.
    ///
    /// Blocks until the full request has been received, invokes the
    /// handler, ships any buffered response data, and guarantees the
    /// peer observes exactly one FIN from this side.
    pub fn run(&self) {
        self.ready.wait();

        let job = {
            let mut inner = self.lock();
            if self.closed_locked(&inner) || inner.state.is_closed() {
                None
            } else {
                let handler = inner.handler.clone();
                let body = std::mem::take(&mut inner.request_body).freeze();
                let request = inner.request.take().map(|mut request| {
                    request.body = body;
                    request
                });
                handler.zip(request)
            }
        };
        let Some((handler, request)) = job else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.serve(self, &request);
        }));
        if let Err(payload) = outcome {
            if !self.state().is_closed() {
                error!(
                    stream_id = self.stream_id.value(),
                    "handler panicked: {}",
                    panic_message(&*payload)
                );
            }
            self.lock().state.close_local();
            return;
        }

        let mut inner = self.lock();

        // Make sure any queued data has been sent.
        if inner.flow.paused() && inner.state.is_open_remote() {
            inner.flow.flush();
        }
        if inner.flow.paused() {
            warn!(
                stream_id = self.stream_id.value(),
                "stream closed with response data still buffered"
            );
        }

        // Close the stream with a SYN_REPLY if none has been sent, or an
        // empty DATA frame if one has. Nothing is owed if this end is
        // already half-closed.
        if !self.unidirectional {
            if inner.state.is_open_local() && !inner.wrote_header {
                inner.headers.set(":status", "200");
                inner.headers.set(":version", "HTTP/1.1");
                let headers = inner.headers.take();
                self.send_locked(
                    &mut inner,
                    Frame::SynReply(SynReplyFrame {
                        stream_id: self.stream_id,
                        fin: true,
                        headers,
                    }),
                );
            } else if inner.state.is_open_local() {
                self.send_locked(
                    &mut inner,
                    Frame::Data(DataFrame {
                        stream_id: self.stream_id,
                        fin: true,
                        data: Bytes::new(),
                    }),
                );
            }
        }

        inner.state.close_local();
    }

    /// Tear the stream down.
    ///
    /// Idempotent: the shutdown sequence runs exactly once. Flushes any
    /// pending headers, forces the terminal state, and drops the
    /// request, handler, and output references. A worker still parked
    /// on the request gate is woken so it can observe the teardown.
    pub fn close(&self) {
        let mut inner = self.lock();
        self.shutdown.call_once(|| {
            self.flush_headers_locked(&mut inner);
            inner.state.close();
            inner.flow.close();
            inner.request_body = BytesMut::new();
            inner.request = None;
            inner.handler = None;
            inner.output = None;
        });
        drop(inner);

        self.ready.fire();
    }
}

impl Stream for ResponseStream {
    fn conn(&self) -> &Arc<Conn> {
        ResponseStream::conn(self)
    }

    fn stream_id(&self) -> StreamId {
        ResponseStream::stream_id(self)
    }

    fn priority(&self) -> Priority {
        ResponseStream::priority(self)
    }

    fn state(&self) -> StreamState {
        ResponseStream::state(self)
    }

    fn receive_frame(&self, frame: Frame) -> Result<(), StreamError> {
        ResponseStream::receive_frame(self, frame)
    }

    fn run(&self) {
        ResponseStream::run(self)
    }

    fn close_notify(&self) -> Arc<Signal> {
        ResponseStream::close_notify(self)
    }

    fn close(&self) {
        ResponseStream::close(self)
    }
}

/// Locked view of a stream's pending response headers.
pub struct HeadersMut<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl Deref for HeadersMut<'_> {
    type Target = Headers;

    fn deref(&self) -> &Headers {
        &self.guard.headers
    }
}

impl DerefMut for HeadersMut<'_> {
    fn deref_mut(&mut self) -> &mut Headers {
        &mut self.guard.headers
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::frame::{PingFrame, Version, WindowUpdateFrame};
    use std::sync::mpsc::{self, Receiver};

    fn noop_handler() -> Arc<dyn Handler> {
        Arc::new(|_: &ResponseStream, _: &Request| {})
    }

    fn syn_stream(fin: bool, unidirectional: bool) -> SynStreamFrame {
        let mut headers = Headers::new();
        headers.set(":method", "GET");
        headers.set(":path", "/");
        SynStreamFrame {
            stream_id: StreamId::new(1),
            assoc_stream_id: StreamId::ZERO,
            priority: Priority::new(4),
            slot: 0,
            fin,
            unidirectional,
            headers,
        }
    }

    fn make_stream(
        frame: &SynStreamFrame,
        window: u32,
    ) -> (ResponseStream, Receiver<Frame>, Arc<Conn>) {
        let (tx, rx) = mpsc::channel();
        let conn = Arc::new(Conn::new(
            Version::Spdy3,
            ConnectionSettings::new().initial_window_size(window),
            tx.clone(),
        ));
        let stream = ResponseStream::new(&conn, frame, tx, noop_handler());
        (stream, rx, conn)
    }

    fn collect(rx: &Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_new_stream_is_open() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(false, false), 65_536);
        assert_eq!(stream.state(), StreamState::Open);
        assert_eq!(stream.stream_id().value(), 1);
        assert_eq!(stream.priority().value(), 4);
        assert!(!stream.is_unidirectional());
    }

    #[test]
    fn test_syn_fin_half_closes_remote() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(true, false), 65_536);
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn test_receive_data_accumulates_body() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(false, false), 65_536);

        stream
            .receive_frame(Frame::Data(DataFrame {
                stream_id: StreamId::new(1),
                fin: false,
                data: Bytes::from_static(b"hello "),
            }))
            .unwrap();
        stream
            .receive_frame(Frame::Data(DataFrame {
                stream_id: StreamId::new(1),
                fin: true,
                data: Bytes::from_static(b"world"),
            }))
            .unwrap();

        assert_eq!(stream.state(), StreamState::HalfClosedRemote);
        let inner = stream.inner.lock().unwrap();
        assert_eq!(&inner.request_body[..], b"hello world");
    }

    #[test]
    fn test_receive_headers_merges_into_pending() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(false, false), 65_536);

        let mut update = Headers::new();
        update.set("x-extra", "1");
        stream
            .receive_frame(Frame::Headers(HeadersFrame {
                stream_id: StreamId::new(1),
                fin: false,
                headers: update,
            }))
            .unwrap();

        assert_eq!(stream.headers().get("x-extra"), Some("1"));
        // HEADERS alone does not complete the request.
        assert_eq!(stream.state(), StreamState::Open);
    }

    #[test]
    fn test_receive_syn_reply_merges_and_fin_closes() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(false, false), 65_536);

        let mut update = Headers::new();
        update.set("x-reply", "yes");
        stream
            .receive_frame(Frame::SynReply(SynReplyFrame {
                stream_id: StreamId::new(1),
                fin: true,
                headers: update,
            }))
            .unwrap();

        assert_eq!(stream.headers().get("x-reply"), Some("yes"));
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn test_receive_window_update_grants_credit() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 5);

        stream.write(b"0123456789").unwrap();
        // 5 bytes on the wire, 5 buffered.
        let frames = collect(&rx);
        assert!(matches!(frames[0], Frame::SynReply(_)));
        assert!(matches!(&frames[1], Frame::Data(f) if f.data.as_ref() == b"01234"));

        stream
            .receive_frame(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: StreamId::new(1),
                delta: 5,
            }))
            .unwrap();
        let frames = collect(&rx);
        assert!(matches!(&frames[0], Frame::Data(f) if f.data.as_ref() == b"56789"));
    }

    #[test]
    fn test_receive_window_update_overflow_resets_stream() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);
        stream.inner.lock().unwrap().flow.update_window(i32::MAX as u32 - 65_536).unwrap();

        let err = stream
            .receive_frame(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: StreamId::new(1),
                delta: 10,
            }))
            .unwrap_err();
        assert!(matches!(err, StreamError::Flow(_)));

        let frames = collect(&rx);
        assert!(matches!(
            &frames[0],
            Frame::RstStream(f) if f.status == StatusCode::FlowControlError
        ));
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_receive_unexpected_frame() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(false, false), 65_536);

        let err = stream
            .receive_frame(Frame::Ping(PingFrame { id: 1 }))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::UnexpectedFrame { frame: "PING", .. }
        ));
    }

    #[test]
    fn test_write_emits_syn_reply_before_data() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        let n = stream.write(b"hi").unwrap();
        assert_eq!(n, 2);

        let frames = collect(&rx);
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            Frame::SynReply(f) => {
                assert!(!f.fin);
                assert_eq!(f.headers.get(":status"), Some("200"));
                assert_eq!(f.headers.get(":version"), Some("HTTP/1.1"));
            }
            other => panic!("expected SYN_REPLY first, got {:?}", other),
        }
        assert!(matches!(&frames[1], Frame::Data(f) if f.data.as_ref() == b"hi"));
    }

    #[test]
    fn test_write_status_204_carries_fin() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        stream.write_status(204);

        let frames = collect(&rx);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::SynReply(f) => {
                assert!(f.fin);
                assert_eq!(f.headers.get(":status"), Some("204"));
            }
            other => panic!("expected SYN_REPLY, got {:?}", other),
        }
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_write_status_1xx_carries_fin() {
        let (stream, rx, _conn) = make_stream(&syn_stream(false, false), 65_536);
        stream.write_status(103);
        let frames = collect(&rx);
        assert!(matches!(&frames[0], Frame::SynReply(f) if f.fin));
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_write_status_twice_is_ignored() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        stream.write_status(200);
        stream.write_status(500);

        let frames = collect(&rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            &frames[0],
            Frame::SynReply(f) if f.headers.get(":status") == Some("200")
        ));
        assert_eq!(stream.status(), 200);
    }

    #[test]
    fn test_headers_set_before_status_ride_the_syn_reply() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        stream.headers().set("content-type", "text/plain");
        stream.write(b"x").unwrap();

        let frames = collect(&rx);
        match &frames[0] {
            Frame::SynReply(f) => {
                assert_eq!(f.headers.get("content-type"), Some("text/plain"));
            }
            other => panic!("expected SYN_REPLY, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_set_after_status_flush_as_headers_frame() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        stream.write_status(200);
        stream.headers().set("x-late", "1");
        stream.write(b"x").unwrap();

        let frames = collect(&rx);
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], Frame::SynReply(_)));
        assert!(matches!(
            &frames[1],
            Frame::Headers(f) if f.headers.get("x-late") == Some("1")
        ));
        assert!(matches!(&frames[2], Frame::Data(_)));
    }

    #[test]
    fn test_write_on_unidirectional_stream_fails() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, true), 65_536);

        let err = stream.write(b"nope").unwrap_err();
        assert_eq!(err.to_string(), "stream is unidirectional");

        stream.write_status(200);
        assert!(collect(&rx).is_empty());
    }

    #[test]
    fn test_write_after_local_half_close_fails() {
        let (stream, _rx, _conn) = make_stream(&syn_stream(true, false), 65_536);
        stream.write_status(204);

        let err = stream.write(b"body").unwrap_err();
        assert_eq!(err.to_string(), "stream already closed");
    }

    #[test]
    fn test_write_after_stop_fails() {
        let (stream, _rx, conn) = make_stream(&syn_stream(true, false), 65_536);
        conn.shutdown();

        let err = stream.write(b"body").unwrap_err();
        assert_eq!(err.to_string(), "stream already closed");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (stream, rx, _conn) = make_stream(&syn_stream(true, false), 65_536);

        stream.headers().set("x-pending", "1");
        stream.close();
        let after_first = collect(&rx).len();
        stream.close();
        stream.close();

        assert_eq!(collect(&rx).len(), 0);
        assert_eq!(after_first, 1); // the pending HEADERS flush
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_close_wakes_parked_worker() {
        let (stream, rx, _conn) = make_stream(&syn_stream(false, false), 65_536);
        let stream = Arc::new(stream);

        let worker = {
            let stream = Arc::clone(&stream);
            std::thread::spawn(move || stream.run())
        };

        stream.close();
        worker.join().unwrap();

        // The worker observed the teardown: no handler ran, no frames.
        assert!(collect(&rx).is_empty());
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_close_notify_is_connection_stop() {
        let (stream, _rx, conn) = make_stream(&syn_stream(true, false), 65_536);
        let notify = stream.close_notify();
        assert!(!notify.is_fired());
        conn.shutdown();
        assert!(notify.is_fired());
    }
}
