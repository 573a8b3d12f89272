//! Server-wide device registry.
//!
//! Devices live in an index-keyed arena. An address keeps its index across
//! reconnects; each reconnect bumps the slot's generation so a handle taken
//! before a removal can't act on the device that later reuses the index.
//! Every registry mutation broadcasts its [`DeviceEvent`] while still holding
//! the registry lock, so subscribers observe events in mutation order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

use hapwire_protocol::{DeviceCommand, DeviceInfo};
use hapwire_runtime::{DeviceCommandError, Result};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::discovery::{DeviceConnector, DeviceDiscovery, DiscoveryMessage, DiscoverySink};
use crate::config::{BusConfiguration, DeviceConfigurationManager};
use crate::device::{CommandOutcome, DeviceHandle};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
	Added(DeviceInfo),
	Removed(u32),
	ScanningFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey {
	pub index: u32,
	pub generation: u32,
}

struct DeviceSlot {
	key: DeviceKey,
	handle: Arc<DeviceHandle>,
}

struct AddressRecord {
	index: u32,
	generation: u32,
}

#[derive(Default)]
struct Registry {
	slots: BTreeMap<u32, DeviceSlot>,
	addresses: HashMap<String, AddressRecord>,
	next_index: u32,
}

pub struct DeviceManager {
	config: Arc<DeviceConfigurationManager>,
	registry: RwLock<Registry>,
	discoveries: Mutex<Vec<Arc<dyn DeviceDiscovery>>>,
	/// Discovery sources that have not reported scan completion.
	scanning: Mutex<HashSet<usize>>,
	events_tx: broadcast::Sender<DeviceEvent>,
	discovery_tx: mpsc::UnboundedSender<DiscoveryMessage>,
	discovery_rx: Mutex<Option<mpsc::UnboundedReceiver<DiscoveryMessage>>>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceManager {
	pub fn new(config: Arc<DeviceConfigurationManager>) -> Arc<Self> {
		let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
		let (discovery_tx, discovery_rx) = mpsc::unbounded_channel();
		Arc::new(Self {
			config,
			registry: RwLock::new(Registry::default()),
			discoveries: Mutex::new(Vec::new()),
			scanning: Mutex::new(HashSet::new()),
			events_tx,
			discovery_tx,
			discovery_rx: Mutex::new(Some(discovery_rx)),
			task: Mutex::new(None),
		})
	}

	pub fn config(&self) -> &Arc<DeviceConfigurationManager> {
		&self.config
	}

	/// Starts processing discovery reports. Later calls are no-ops.
	pub fn start(self: &Arc<Self>) {
		let Some(mut rx) = self.discovery_rx.lock().take() else {
			return;
		};
		let weak = Arc::downgrade(self);
		let handle = tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				let Some(manager) = weak.upgrade() else {
					break;
				};
				manager.handle_discovery(message);
			}
			tracing::debug!(target = "hapwire.device", "Discovery loop stopped");
		});
		*self.task.lock() = Some(handle);
	}

	pub fn add_discovery(&self, discovery: Arc<dyn DeviceDiscovery>) {
		tracing::debug!(target = "hapwire.device", discovery = discovery.name(), "Registered discovery source");
		self.discoveries.lock().push(discovery);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
		self.events_tx.subscribe()
	}

	pub async fn start_scanning(&self) -> Result<()> {
		let discoveries: Vec<_> = self.discoveries.lock().iter().cloned().enumerate().collect();
		if discoveries.is_empty() {
			tracing::info!(target = "hapwire.device", "No discovery sources; scan finishes immediately");
			let _ = self.events_tx.send(DeviceEvent::ScanningFinished);
			return Ok(());
		}

		self.scanning.lock().extend(discoveries.iter().map(|(i, _)| *i));
		for (source, discovery) in discoveries {
			let sink = DiscoverySink::new(source, self.discovery_tx.clone());
			if let Err(e) = discovery.start_scanning(sink).await {
				tracing::warn!(target = "hapwire.device", discovery = discovery.name(), error = %e, "Failed to start scanning");
				self.finish_source(source);
			}
		}
		Ok(())
	}

	pub async fn stop_scanning(&self) -> Result<()> {
		let discoveries: Vec<_> = self.discoveries.lock().clone();
		for discovery in discoveries {
			discovery.stop_scanning().await?;
		}
		Ok(())
	}

	pub fn is_scanning(&self) -> bool {
		!self.scanning.lock().is_empty()
	}

	pub fn devices(&self) -> Vec<DeviceInfo> {
		self.registry
			.read()
			.slots
			.values()
			.map(|slot| slot.handle.info(slot.key.index))
			.collect()
	}

	pub fn device(&self, index: u32) -> Option<(DeviceKey, Arc<DeviceHandle>)> {
		self.registry
			.read()
			.slots
			.get(&index)
			.map(|slot| (slot.key, Arc::clone(&slot.handle)))
	}

	/// Routes a command to a device. Device loss during the command removes
	/// the device and still counts as success.
	pub async fn send_command(&self, index: u32, command: DeviceCommand) -> Result<()> {
		let (key, handle) = self
			.device(index)
			.ok_or(DeviceCommandError::DeviceNotAvailable(index))?;

		match handle.handle_command(index, command).await? {
			CommandOutcome::Applied => Ok(()),
			CommandOutcome::DeviceLost => {
				if let Some(handle) = self.remove_key(key) {
					handle.disconnect().await;
				}
				Ok(())
			}
		}
	}

	/// Stops every device. Failures are logged and do not stop the sweep.
	pub async fn stop_all(&self) {
		let indices: Vec<u32> = self.registry.read().slots.keys().copied().collect();
		for index in indices {
			if let Err(e) = self.send_command(index, DeviceCommand::Stop).await {
				tracing::warn!(target = "hapwire.device", index, error = %e, "Failed to stop device");
			}
		}
	}

	/// Removes a device and releases its hardware.
	pub async fn remove_device(&self, index: u32) -> bool {
		let handle = {
			let mut registry = self.registry.write();
			let removed = registry.slots.remove(&index);
			if removed.is_some() {
				let _ = self.events_tx.send(DeviceEvent::Removed(index));
			}
			removed
		};
		match handle {
			Some(slot) => {
				slot.handle.disconnect().await;
				true
			}
			None => false,
		}
	}

	/// Stops scanning, then removes and disconnects every device.
	pub async fn shutdown(&self) {
		if let Err(e) = self.stop_scanning().await {
			tracing::warn!(target = "hapwire.device", error = %e, "Failed to stop scanning during shutdown");
		}
		let indices: Vec<u32> = self.registry.read().slots.keys().copied().collect();
		for index in indices {
			self.remove_device(index).await;
		}
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}
	}

	/// Inserts a connected device, returning its index. A second live device
	/// at the same address is refused.
	pub fn add_device(&self, handle: Arc<DeviceHandle>) -> Option<u32> {
		let mut registry = self.registry.write();
		let registry = &mut *registry;
		let address = handle.address().to_string();

		let key = match registry.addresses.get_mut(&address) {
			Some(record) if registry.slots.contains_key(&record.index) => {
				tracing::debug!(target = "hapwire.device", address = %address, "Device already connected");
				return None;
			}
			Some(record) => {
				record.generation += 1;
				DeviceKey {
					index: record.index,
					generation: record.generation,
				}
			}
			None => {
				let index = registry.next_index;
				registry.next_index += 1;
				registry.addresses.insert(
					address.clone(),
					AddressRecord {
						index,
						generation: 0,
					},
				);
				DeviceKey {
					index,
					generation: 0,
				}
			}
		};

		let info = handle.info(key.index);
		tracing::info!(target = "hapwire.device", index = key.index, name = %info.device_name, protocol = handle.protocol(), "Device added");
		registry.slots.insert(key.index, DeviceSlot { key, handle });
		let _ = self.events_tx.send(DeviceEvent::Added(info));
		Some(key.index)
	}

	fn remove_key(&self, key: DeviceKey) -> Option<Arc<DeviceHandle>> {
		let mut registry = self.registry.write();
		if registry.slots.get(&key.index).map(|s| s.key) != Some(key) {
			return None;
		}
		let slot = registry.slots.remove(&key.index)?;
		tracing::info!(target = "hapwire.device", index = key.index, "Device removed");
		let _ = self.events_tx.send(DeviceEvent::Removed(key.index));
		Some(slot.handle)
	}

	fn finish_source(&self, source: usize) {
		let mut scanning = self.scanning.lock();
		if scanning.remove(&source) && scanning.is_empty() {
			tracing::info!(target = "hapwire.device", "Scanning finished");
			let _ = self.events_tx.send(DeviceEvent::ScanningFinished);
		}
	}

	fn handle_discovery(self: Arc<Self>, message: DiscoveryMessage) {
		match message {
			DiscoveryMessage::Discovered {
				candidate,
				connector,
			} => {
				tokio::spawn(connect_candidate(Arc::downgrade(&self), candidate, connector));
			}
			DiscoveryMessage::ScanComplete { source } => self.finish_source(source),
			DiscoveryMessage::Lost { address } => {
				let key = {
					let registry = self.registry.read();
					registry
						.addresses
						.get(&address)
						.and_then(|record| registry.slots.get(&record.index))
						.map(|slot| slot.key)
				};
				if let Some(handle) = key.and_then(|key| self.remove_key(key)) {
					tokio::spawn(async move { handle.disconnect().await });
				}
			}
		}
	}
}

async fn connect_candidate(
	manager: Weak<DeviceManager>,
	candidate: BusConfiguration,
	connector: Box<dyn DeviceConnector>,
) {
	let Some(factory) = manager.upgrade().and_then(|m| m.config.resolve(&candidate)) else {
		tracing::debug!(target = "hapwire.device", candidate = %candidate.describe(), "No protocol for discovered device");
		return;
	};

	let hardware = match connector.connect(&factory).await {
		Ok(hardware) => hardware,
		Err(e) => {
			tracing::warn!(target = "hapwire.device", candidate = %candidate.describe(), error = %e, "Failed to connect device");
			return;
		}
	};

	let handle = Arc::new(factory.create(hardware));
	let Some(manager) = manager.upgrade() else {
		handle.disconnect().await;
		return;
	};
	if manager.add_device(Arc::clone(&handle)).is_none() {
		handle.disconnect().await;
	}
}
