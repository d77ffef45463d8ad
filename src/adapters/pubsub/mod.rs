//! External event-sink adapters for the pub/sub bridge port.

mod http_bridge;
mod noop;

pub use http_bridge::HttpBridgeEventSink;
pub use noop::NoopEventSink;
