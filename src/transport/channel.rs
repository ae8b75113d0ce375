//! Trait abstraction for the telemetry connection to enable testing

use async_trait::async_trait;

use crate::error::Result;

/// An open, bidirectional text channel
#[async_trait]
pub trait Channel: Send {
    /// Wait for the next text message
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Send a text message (handshake and protocol control only)
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Close the channel. Errors are swallowed; the channel is gone either way.
    async fn close(&mut self);
}

/// Factory for channels; called once per connection attempt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send {
    /// Establish a new channel
    async fn connect(&mut self) -> Result<Box<dyn Channel>>;

    /// Human-readable endpoint for log messages
    fn endpoint(&self) -> String;
}
