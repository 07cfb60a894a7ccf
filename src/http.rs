//! The HTTP surface the engine exposes to application code.

use bytes::Bytes;

use crate::frame::{Priority, SynStreamFrame};
use crate::header::Headers;
use crate::stream::ResponseStream;

/// An HTTP request materialised from a stream's inbound frames.
///
/// The request line fields come from the opening frame's pseudo-headers;
/// the body is attached once the peer half-closes.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub scheme: String,
    pub host: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
    pub priority: Priority,
}

impl Request {
    pub(crate) fn from_syn_stream(frame: &SynStreamFrame) -> Self {
        let mut headers = frame.headers.clone();
        let mut pseudo = |name: &str| {
            let value = headers.get(name).unwrap_or("").to_string();
            headers.del(name);
            value
        };

        let method = pseudo(":method");
        let path = pseudo(":path");
        let scheme = pseudo(":scheme");
        let host = pseudo(":host");
        let version = pseudo(":version");

        Self {
            method,
            path,
            scheme,
            host,
            version,
            headers,
            body: Bytes::new(),
            priority: frame.priority,
        }
    }
}

/// A request handler.
///
/// Implementations are shared across streams and invoked synchronously
/// on each stream's worker. Writes through the response stream are
/// chunked and flow controlled; `close_notify` exposes the connection's
/// stop signal so long-running handlers can abandon work when the peer
/// goes away.
pub trait Handler: Send + Sync {
    fn serve(&self, response: &ResponseStream, request: &Request);
}

impl<F> Handler for F
where
    F: Fn(&ResponseStream, &Request) + Send + Sync,
{
    fn serve(&self, response: &ResponseStream, request: &Request) {
        self(response, request)
    }
}
