//! Seams between the device manager and bus-specific discovery code.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use hapwire_runtime::Result;
use tokio::sync::mpsc;

use crate::config::BusConfiguration;
use crate::device::{DeviceFactory, HardwareDevice};

/// Opens the hardware behind one discovered candidate.
pub trait DeviceConnector: Send + Sync {
	fn connect<'a>(
		&'a self,
		factory: &'a DeviceFactory,
	) -> BoxFuture<'a, Result<Arc<dyn HardwareDevice>>>;
}

/// A bus scanner (BLE adapter, USB enumerator, ...).
pub trait DeviceDiscovery: Send + Sync {
	fn name(&self) -> &str;

	/// Starts (or keeps) scanning, reporting through `sink`.
	fn start_scanning(&self, sink: DiscoverySink) -> BoxFuture<'_, Result<()>>;

	/// Requests a stop. Completion is reported via [`DiscoverySink::scan_complete`].
	fn stop_scanning(&self) -> BoxFuture<'_, Result<()>>;

	fn is_scanning(&self) -> bool;
}

pub(crate) enum DiscoveryMessage {
	Discovered {
		candidate: BusConfiguration,
		connector: Box<dyn DeviceConnector>,
	},
	ScanComplete {
		source: usize,
	},
	Lost {
		address: String,
	},
}

/// Handle a discovery collaborator reports through. Cheap to clone.
#[derive(Clone)]
pub struct DiscoverySink {
	source: usize,
	tx: mpsc::UnboundedSender<DiscoveryMessage>,
}

impl DiscoverySink {
	pub(crate) fn new(source: usize, tx: mpsc::UnboundedSender<DiscoveryMessage>) -> Self {
		Self { source, tx }
	}

	pub fn device_discovered(&self, candidate: BusConfiguration, connector: impl DeviceConnector + 'static) {
		let _ = self.tx.send(DiscoveryMessage::Discovered {
			candidate,
			connector: Box::new(connector),
		});
	}

	pub fn scan_complete(&self) {
		let _ = self.tx.send(DiscoveryMessage::ScanComplete {
			source: self.source,
		});
	}

	/// Reports that hardware at `address` went away outside of a command.
	pub fn device_lost(&self, address: &str) {
		let _ = self.tx.send(DiscoveryMessage::Lost {
			address: address.to_string(),
		});
	}
}
