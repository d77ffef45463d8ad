//! Concrete adapters implementing the domain ports.

pub mod agent_runtime_http;
pub mod pubsub;
pub mod sqlite;
pub mod sse_stream;
