//! Live status monitoring.
//!
//! The monitor module is responsible for:
//! - Probing whether an account is broadcasting
//! - Escalating from cheap probes to thorough ones
//! - Periodically reconciling recorded live state with probe results

mod http_probe;
mod probe;
mod service;

pub use http_probe::HttpStatusProbe;
pub use probe::{HandshakeProbe, LayeredProbe, LiveProbe};
pub use service::{ReconciliationConfig, ReconciliationScheduler, SweepReport};
