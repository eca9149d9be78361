//! Line-oriented streamed responses.

use axum::body::Body;
use gangway_core::{LOG_PREFIX, STATUS_OK};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Sink for the plain-text log streamed back to the client.
///
/// Every line becomes its own body chunk, so it reaches the client as soon
/// as it is written. The sink outlives the response body: when the client
/// disconnects, sends fail silently and the deployment runs to completion;
/// aborting mid-phase would leave the host in an undefined state.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LogSink {
    /// Create a sink together with the response body it feeds.
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
        (Self { tx }, Body::from_stream(stream))
    }

    /// Sink plus raw receiver, for tests that assert on emitted lines.
    pub fn capture() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Write one prefixed log line.
    pub fn line(&self, msg: impl AsRef<str>) {
        let _ = self.tx.send(format!("{LOG_PREFIX} {}\n", msg.as_ref()));
    }

    /// Write one prefixed warning line.
    pub fn warn(&self, msg: impl AsRef<str>) {
        self.line(format!("WARNING: {}", msg.as_ref()));
    }

    /// Write one prefixed error line.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.line(format!("ERROR: {}", msg.as_ref()));
    }

    /// Forward raw output (subprocess stdout or stderr), normalizing the
    /// trailing newline. Empty output is dropped.
    pub fn raw(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut chunk = text.to_string();
        if !chunk.ends_with('\n') {
            chunk.push('\n');
        }
        let _ = self.tx.send(chunk);
    }

    /// Write the terminal sentinel line.
    pub fn status_ok(&self) {
        let _ = self.tx.send(format!("{STATUS_OK}\n"));
    }
}
