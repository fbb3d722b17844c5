//! Event stream source trait and connection handle.
//!
//! Defines the interface for transports that open a live event feed for
//! an account.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::StreamEvent;
use crate::Result;
use crate::domain::Handle;

/// Opens event streams for accounts.
#[async_trait]
pub trait EventStreamSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Open a stream for the handle.
    ///
    /// Dropping the returned future before it resolves must release anything
    /// it acquired; callers enforce timeouts that way.
    async fn open(&self, handle: &Handle) -> Result<StreamConnection>;
}

/// A running event stream.
///
/// Closing is idempotent and safe at any point, including after the
/// transport has already failed.
#[derive(Debug)]
pub struct StreamConnection {
    id: String,
    handle: Handle,
    events: Option<mpsc::Receiver<StreamEvent>>,
    shutdown: CancellationToken,
}

impl StreamConnection {
    /// Create a connection from an event receiver and the token the transport
    /// task watches for shutdown.
    pub fn new(
        handle: Handle,
        events: mpsc::Receiver<StreamEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            handle,
            events: Some(events),
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Take the event receiver. Returns `None` once taken.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.events.take()
    }

    /// A token that closes this stream when cancelled.
    pub fn closer(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tear down the stream.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
