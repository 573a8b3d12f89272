//! In-memory transport connecting two peers in the same process.

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

pub struct ChannelTransportSender {
	peer_tx: mpsc::UnboundedSender<Value>,
}

impl Transport for ChannelTransportSender {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		let result = self
			.peer_tx
			.send(message)
			.map_err(|_| Error::Transport("peer closed".to_string()));
		Box::pin(async move { result })
	}
}

/// Frames are delivered straight into the peer's inbound channel, so there
/// is nothing to pump.
pub struct ChannelTransportReceiver;

impl TransportReceiver for ChannelTransportReceiver {
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

/// Creates two connected transports. Dropping either sender closes the other
/// side's inbound channel.
pub fn channel_pair() -> (TransportParts, TransportParts) {
	let (a_tx, a_rx) = mpsc::unbounded_channel();
	let (b_tx, b_rx) = mpsc::unbounded_channel();

	let a = TransportParts {
		sender: Box::new(ChannelTransportSender { peer_tx: b_tx }),
		receiver: Box::new(ChannelTransportReceiver),
		message_rx: a_rx,
	};
	let b = TransportParts {
		sender: Box::new(ChannelTransportSender { peer_tx: a_tx }),
		receiver: Box::new(ChannelTransportReceiver),
		message_rx: b_rx,
	};
	(a, b)
}
