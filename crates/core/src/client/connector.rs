//! Ways for a client to reach a server.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use hapwire_runtime::{PipeTransport, Result, TransportParts, channel_pair};
use tokio::net::TcpStream;

use crate::server::{DeviceManager, LogForwarder, ServerOptions, ServerSession, serve};

/// Opens a fresh transport for each connect attempt.
pub trait ClientConnector: Send + Sync {
	fn connect(&self) -> BoxFuture<'_, Result<TransportParts>>;
}

/// Runs a server session in this process, connected through in-memory
/// channels.
pub struct EmbeddedConnector {
	devices: Arc<DeviceManager>,
	options: ServerOptions,
	logs: Option<LogForwarder>,
}

impl EmbeddedConnector {
	pub fn new(devices: Arc<DeviceManager>, options: ServerOptions) -> Self {
		Self {
			devices,
			options,
			logs: None,
		}
	}

	pub fn with_log_forwarder(mut self, logs: LogForwarder) -> Self {
		self.logs = Some(logs);
		self
	}
}

impl ClientConnector for EmbeddedConnector {
	fn connect(&self) -> BoxFuture<'_, Result<TransportParts>> {
		Box::pin(async move {
			let (client_side, server_side) = channel_pair();
			let mut session = ServerSession::new(self.options.clone(), Arc::clone(&self.devices));
			if let Some(logs) = &self.logs {
				session = session.with_log_forwarder(logs.clone());
			}
			tokio::spawn(serve(session, server_side));
			Ok(client_side)
		})
	}
}

/// Connects to a `hapwire serve` listener over TCP.
pub struct TcpConnector {
	address: String,
}

impl TcpConnector {
	pub fn new(address: impl Into<String>) -> Self {
		Self {
			address: address.into(),
		}
	}
}

impl ClientConnector for TcpConnector {
	fn connect(&self) -> BoxFuture<'_, Result<TransportParts>> {
		Box::pin(async move {
			let stream = TcpStream::connect(&self.address).await?;
			stream.set_nodelay(true)?;
			let (read, write) = stream.into_split();
			let (transport, message_rx) = PipeTransport::new(write, read);
			Ok(transport.into_transport_parts(message_rx))
		})
	}
}
