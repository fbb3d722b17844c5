//! Event stream contract.
//!
//! An admitted account gets one running event stream that pushes comments,
//! gifts, viewer counts and follows until the broadcast ends or the stream
//! is torn down.

mod events;
mod source;
pub mod websocket;

pub use events::StreamEvent;
pub use source::{EventStreamSource, StreamConnection};
pub use websocket::WebSocketEventSource;
