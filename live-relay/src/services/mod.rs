//! Service layer.
//!
//! The relay facade that outer surfaces (HTTP handlers, CLIs) call into.

mod relay;

pub use relay::{RelayDependencies, RelayService, RelayStats, TrackResult};
