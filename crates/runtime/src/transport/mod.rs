//! Message transports.
//!
//! A transport moves JSON frames between two peers and knows nothing about
//! message semantics. It is split into a sending half ([`Transport`]) and a
//! receiving half ([`TransportReceiver`]) whose `run` loop pushes every
//! inbound frame into an unbounded channel. Dropping the sending half closes
//! the outbound direction.
//!
//! - [`PipeTransport`] frames messages over any byte stream with a 4-byte
//!   little-endian length prefix (TCP sockets, pipes, duplex streams).
//! - [`channel_pair`] connects two peers in memory, for embedded servers.

mod channel;
mod pipe;
#[cfg(test)]
mod tests;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

pub use channel::{ChannelTransportReceiver, ChannelTransportSender, channel_pair};
pub use pipe::{MAX_FRAME_LEN, PipeTransport, PipeTransportReceiver, PipeTransportSender};

use crate::error::Result;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one frame to the peer.
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the peer closes, forwarding each to the message channel.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// A transport split into the pieces a connection loop consumes.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	/// Inbound frames produced by `receiver`.
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}
