//! In-memory hardware and discovery, for tests and the `--simulate-device`
//! server flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use hapwire_runtime::{Error, Result};
use parking_lot::Mutex;

use crate::config::{BleConfiguration, BusConfiguration};
use crate::device::{DeviceFactory, HardwareDevice, HardwareError, HardwareWrite};
use crate::server::{DeviceConnector, DeviceDiscovery, DiscoverySink};

/// Hardware that records every write.
pub struct SimulatedHardware {
	name: String,
	address: String,
	connected: AtomicBool,
	writes: Mutex<Vec<HardwareWrite>>,
	fail_next: Mutex<Option<HardwareError>>,
}

impl SimulatedHardware {
	pub fn new(name: &str, address: &str) -> Arc<Self> {
		Arc::new(Self {
			name: name.to_string(),
			address: address.to_string(),
			connected: AtomicBool::new(true),
			writes: Mutex::new(Vec::new()),
			fail_next: Mutex::new(None),
		})
	}

	pub fn writes(&self) -> Vec<HardwareWrite> {
		self.writes.lock().clone()
	}

	pub fn last_write(&self) -> Option<HardwareWrite> {
		self.writes.lock().last().cloned()
	}

	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	/// Simulates the device dropping off the bus; later writes report
	/// [`HardwareError::Disconnected`].
	pub fn unplug(&self) {
		self.connected.store(false, Ordering::SeqCst);
	}

	pub fn fail_next_write(&self, error: HardwareError) {
		*self.fail_next.lock() = Some(error);
	}
}

impl HardwareDevice for SimulatedHardware {
	fn name(&self) -> &str {
		&self.name
	}

	fn address(&self) -> &str {
		&self.address
	}

	fn write(&self, write: HardwareWrite) -> BoxFuture<'_, std::result::Result<(), HardwareError>> {
		Box::pin(async move {
			if let Some(error) = self.fail_next.lock().take() {
				return Err(error);
			}
			if !self.is_connected() {
				return Err(HardwareError::Disconnected);
			}
			self.writes.lock().push(write);
			Ok(())
		})
	}

	fn disconnect(&self) -> BoxFuture<'_, ()> {
		Box::pin(async move {
			self.connected.store(false, Ordering::SeqCst);
		})
	}
}

/// Hands out a prepared [`SimulatedHardware`].
pub struct SimulatedConnector {
	hardware: Arc<SimulatedHardware>,
}

impl SimulatedConnector {
	pub fn new(hardware: Arc<SimulatedHardware>) -> Self {
		Self { hardware }
	}
}

impl DeviceConnector for SimulatedConnector {
	fn connect<'a>(
		&'a self,
		_factory: &'a DeviceFactory,
	) -> BoxFuture<'a, Result<Arc<dyn HardwareDevice>>> {
		Box::pin(async move {
			if !self.hardware.is_connected() {
				return Err(Error::Transport(format!(
					"{} is not reachable",
					self.hardware.address
				)));
			}
			Ok(Arc::clone(&self.hardware) as Arc<dyn HardwareDevice>)
		})
	}
}

/// Discovery source that reports its devices whenever scanning starts and
/// completes when asked to stop.
#[derive(Default)]
pub struct SimulatedDiscovery {
	devices: Mutex<Vec<(BusConfiguration, Arc<SimulatedHardware>)>>,
	sink: Mutex<Option<DiscoverySink>>,
	scanning: AtomicBool,
}

impl SimulatedDiscovery {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Adds a BLE peripheral advertising `name`.
	pub fn add_ble(&self, name: &str, address: &str) -> Arc<SimulatedHardware> {
		let hardware = SimulatedHardware::new(name, address);
		let candidate = BusConfiguration::Btle(BleConfiguration::advertised(name, &[]));
		self.add(candidate, Arc::clone(&hardware));
		hardware
	}

	/// Adds a device; it is reported immediately if a scan is running.
	pub fn add(&self, candidate: BusConfiguration, hardware: Arc<SimulatedHardware>) {
		if self.scanning.load(Ordering::SeqCst) {
			if let Some(sink) = self.sink.lock().as_ref() {
				sink.device_discovered(candidate.clone(), SimulatedConnector::new(Arc::clone(&hardware)));
			}
		}
		self.devices.lock().push((candidate, hardware));
	}

	/// Unplugs the device at `address` and reports the loss.
	pub fn remove(&self, address: &str) {
		let mut devices = self.devices.lock();
		if let Some(position) = devices.iter().position(|(_, hw)| hw.address == address) {
			let (_, hardware) = devices.remove(position);
			hardware.unplug();
			if let Some(sink) = self.sink.lock().as_ref() {
				sink.device_lost(address);
			}
		}
	}
}

impl DeviceDiscovery for SimulatedDiscovery {
	fn name(&self) -> &str {
		"simulated"
	}

	fn start_scanning(&self, sink: DiscoverySink) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.scanning.store(true, Ordering::SeqCst);
			for (candidate, hardware) in self.devices.lock().iter() {
				sink.device_discovered(candidate.clone(), SimulatedConnector::new(Arc::clone(hardware)));
			}
			*self.sink.lock() = Some(sink);
			Ok(())
		})
	}

	fn stop_scanning(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			if self.scanning.swap(false, Ordering::SeqCst) {
				if let Some(sink) = self.sink.lock().as_ref() {
					sink.scan_complete();
				}
			}
			Ok(())
		})
	}

	fn is_scanning(&self) -> bool {
		self.scanning.load(Ordering::SeqCst)
	}
}
