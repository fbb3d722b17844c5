//! In-memory live state.

mod store;

pub use store::{LiveSignal, LiveStateStore, LiveTransition};
