//! Boundary to the transport that actually talks to a device.

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Named channel on the hardware a protocol writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
	Tx,
	Rx,
	Command,
}

/// One write request produced by a protocol encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareWrite {
	pub endpoint: Endpoint,
	pub data: Vec<u8>,
	pub write_with_response: bool,
}

impl HardwareWrite {
	pub fn new(endpoint: Endpoint, data: Vec<u8>) -> Self {
		Self {
			endpoint,
			data,
			write_with_response: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
	/// The device went away. Callers treat this as device loss, not failure.
	#[error("device disconnected")]
	Disconnected,

	#[error("{0}")]
	Io(String),
}

/// A connected physical (or simulated) device.
pub trait HardwareDevice: Send + Sync {
	fn name(&self) -> &str;

	/// Stable bus address; the same device reconnecting reports the same value.
	fn address(&self) -> &str;

	fn write(&self, write: HardwareWrite) -> BoxFuture<'_, Result<(), HardwareError>>;

	fn disconnect(&self) -> BoxFuture<'_, ()>;
}
