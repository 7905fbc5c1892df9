//! Event sinks.
//!
//! The session hands every decoded frame to an [`EventSink`]. What happens
//! afterwards belongs to the host: the session never waits on a result and
//! never sees a sink failure.

mod channel;
mod line;

use std::future::Future;

use gateway_proto::GatewayMessage;

pub use channel::ChannelSink;
pub use line::LineSink;

/// Consumer of decoded gateway messages.
pub trait EventSink: Send + Sync {
    /// Hand one message to the host.
    ///
    /// Implementations deal with their own failures, usually by logging.
    fn deliver(&self, message: GatewayMessage) -> impl Future<Output = ()> + Send;
}
