//! Streaming-safe body capture
//!
//! Two strategies for observing a body without breaking streaming delivery:
//!
//! - [`read_prefix`] eagerly reads up to a cap and hands back a body that
//!   replays the prefix followed by the unread remainder. Used for request
//!   snapshots and buffered error responses.
//! - [`CaptureBody`] wraps a body in a pass-through decorator that mirrors
//!   bytes into a log buffer as the client reads them, emitting the record
//!   when the stream ends or the body is dropped. Used for chunked and
//!   verbose-mode responses, where the stream may stay open indefinitely.

use crate::proxy::redact::redact;
use crate::proxy::sink::{DiagnosticRecord, DiagnosticSink, Direction};
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Upper bound on captured body bytes (per record)
pub const MAX_CAPTURE_BYTES: usize = 1 << 20; // 1 MiB

/// Read up to `cap` bytes from `body`, returning the snippet, whether it was
/// cut short, and a body that still delivers every byte to the consumer.
pub(crate) async fn read_prefix(
    body: Body,
    cap: usize,
) -> Result<(Bytes, bool, Body), axum::Error> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                buf.extend_from_slice(&chunk);
                // Keep reading at exactly `cap`: only bytes beyond it prove
                // the snippet was cut short.
                if buf.len() > cap {
                    // Remainder still unread: replay the prefix, then the
                    // rest of the stream.
                    let prefix = buf.freeze();
                    let snippet = prefix.slice(..cap);
                    let replay =
                        futures_util::stream::iter([Ok::<_, axum::Error>(prefix.clone())]);
                    let body = Body::from_stream(replay.chain(stream));
                    return Ok((snippet, true, body));
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                let prefix = buf.freeze();
                return Ok((prefix.clone(), false, Body::from(prefix)));
            }
        }
    }
}

/// Metadata attached to a response capture
pub struct CaptureMeta {
    pub method: String,
    pub uri: String,
    pub status: u16,
    /// Raw header dump; redacted at emission time
    pub headers: String,
}

struct CaptureState {
    meta: CaptureMeta,
    sink: Arc<dyn DiagnosticSink>,
    /// Configured secret for redaction; empty when no key is set
    secret: String,
    captured: BytesMut,
    cap: usize,
    truncated: bool,
    emitted: bool,
}

impl CaptureState {
    fn observe(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let room = self.cap.saturating_sub(self.captured.len());
        if room == 0 {
            self.truncated = true;
            return;
        }
        if chunk.len() > room {
            self.captured.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        } else {
            self.captured.extend_from_slice(chunk);
        }
    }

    fn finish(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;
        let body = redact(&self.secret, &String::from_utf8_lossy(&self.captured));
        let headers = redact(&self.secret, &self.meta.headers);
        self.sink.record(DiagnosticRecord {
            direction: Direction::Response,
            method: self.meta.method.clone(),
            uri: self.meta.uri.clone(),
            status: Some(self.meta.status),
            headers,
            body,
            truncated: self.truncated,
        });
    }
}

pin_project! {
    /// Pass-through body that mirrors data into a capped capture buffer.
    ///
    /// Frames are forwarded untouched; the record is emitted exactly once,
    /// on end-of-stream, on a stream error, or when the body is dropped
    /// (client disconnect).
    pub struct CaptureBody<B> {
        #[pin]
        inner: B,
        state: CaptureState,
    }

    impl<B> PinnedDrop for CaptureBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            this.state.finish();
        }
    }
}

impl<B> CaptureBody<B> {
    pub fn new(
        inner: B,
        meta: CaptureMeta,
        sink: Arc<dyn DiagnosticSink>,
        secret: String,
        cap: usize,
    ) -> Self {
        Self {
            inner,
            state: CaptureState {
                meta,
                sink,
                secret,
                captured: BytesMut::new(),
                cap,
                truncated: false,
                emitted: false,
            },
        }
    }
}

impl<B> http_body::Body for CaptureBody<B>
where
    B: http_body::Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.state.observe(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.state.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}
