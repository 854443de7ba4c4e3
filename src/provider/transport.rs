//! Transport seams between the agent loop and the network.
//!
//! A transport moves already-built JSON request bodies and returns raw
//! provider JSON. It knows nothing about messages, tools or events, so
//! tests can script whole conversations with an in-memory transport.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Raw provider stream events, consumed from blocking code.
pub type RawEventIter = Box<dyn Iterator<Item = Result<serde_json::Value>> + Send>;

/// Raw provider stream events, consumed from async code.
pub type RawEventStream = BoxStream<'static, Result<serde_json::Value>>;

/// Blocking transport.
pub trait Transport: Send + Sync {
    /// Send a non-streaming request and return the raw response body.
    fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value>;

    /// Open a streaming request and return its decoded events.
    fn open_stream(&self, body: &serde_json::Value) -> Result<RawEventIter>;
}

/// Async transport.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value>;

    async fn open_stream(&self, body: &serde_json::Value) -> Result<RawEventStream>;
}
