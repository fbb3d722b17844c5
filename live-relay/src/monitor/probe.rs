//! Live status probing.
//!
//! A [`LiveProbe`] answers whether an account is broadcasting with a
//! tri-state [`ProbeOutcome`]. [`LayeredProbe`] chains strategies from cheap
//! to thorough and stops at the first conclusive answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::Result;
use crate::domain::{Handle, ProbeOutcome};
use crate::stream::EventStreamSource;

/// One strategy for determining live status.
#[async_trait]
pub trait LiveProbe: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &str;

    /// Probe the handle.
    ///
    /// Errors are treated like [`ProbeOutcome::Unknown`] by callers.
    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome>;
}

struct ProbeStep {
    probe: Arc<dyn LiveProbe>,
    timeout: Duration,
}

/// Prioritized list of probe strategies.
///
/// Each step runs under its own timeout. An error, a timeout or `Unknown`
/// escalates to the next step; if every step is inconclusive the result is
/// `Unknown`.
#[derive(Default)]
pub struct LayeredProbe {
    steps: Vec<ProbeStep>,
}

impl LayeredProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy, tried after every strategy added before it.
    pub fn with_step(mut self, probe: Arc<dyn LiveProbe>, timeout: Duration) -> Self {
        self.steps.push(ProbeStep { probe, timeout });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
impl LiveProbe for LayeredProbe {
    fn name(&self) -> &str {
        "layered"
    }

    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome> {
        for step in &self.steps {
            let name = step.probe.name();
            match tokio::time::timeout(step.timeout, step.probe.probe(handle)).await {
                Ok(Ok(outcome)) if outcome.is_conclusive() => {
                    trace!(handle = %handle, probe = name, ?outcome, "Probe resolved");
                    return Ok(outcome);
                }
                Ok(Ok(_)) => {
                    trace!(handle = %handle, probe = name, "Probe inconclusive");
                }
                Ok(Err(e)) => {
                    debug!(handle = %handle, probe = name, "Probe failed: {}", e);
                }
                Err(_) => {
                    debug!(handle = %handle, probe = name, timeout = ?step.timeout, "Probe timed out");
                }
            }
        }
        Ok(ProbeOutcome::Unknown)
    }
}

/// Probes by opening a test event stream.
///
/// A successful open means the account is broadcasting. A failed open proves
/// nothing, so it is `Unknown`. The test stream is always closed.
pub struct HandshakeProbe {
    source: Arc<dyn EventStreamSource>,
}

impl HandshakeProbe {
    pub fn new(source: Arc<dyn EventStreamSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LiveProbe for HandshakeProbe {
    fn name(&self) -> &str {
        "handshake"
    }

    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome> {
        match self.source.open(handle).await {
            Ok(connection) => {
                connection.close();
                Ok(ProbeOutcome::Live)
            }
            Err(e) => {
                trace!(handle = %handle, "Handshake probe failed: {}", e);
                Ok(ProbeOutcome::Unknown)
            }
        }
    }
}
