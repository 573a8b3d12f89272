//! Client-side mirror of the server's device registry.
//!
//! Uses [`DashMap`] for concurrent access. Per-index [`Notify`] wakes only
//! the waiters for that index, and [`DeviceRegistry::wait_for`] registers
//! its waiter before checking so an insert can't slip between the two.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hapwire_protocol::{AllowedMessages, DeviceCommandKind, DeviceInfo};
use hapwire_runtime::{Error, Result};
use tokio::sync::Notify;

/// Snapshot of a remote device.
///
/// The generation is assigned locally on insert; a device that is removed
/// and re-added under the same index gets a new one, so a stale snapshot
/// can't address its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDevice {
	pub index: u32,
	pub name: String,
	pub allowed_messages: AllowedMessages,
	generation: u64,
}

impl ClientDevice {
	pub fn allows(&self, kind: DeviceCommandKind) -> bool {
		self.allowed_messages.contains_key(&kind)
	}

	/// Feature count advertised for `kind`, if any.
	pub fn feature_count(&self, kind: DeviceCommandKind) -> Option<u32> {
		self.allowed_messages
			.get(&kind)
			.and_then(|attributes| attributes.feature_count)
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}
}

#[derive(Default)]
pub struct DeviceRegistry {
	devices: DashMap<u32, ClientDevice>,
	waiters: DashMap<u32, Arc<Notify>>,
	next_generation: AtomicU64,
}

impl DeviceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a device unless its index is already present, notifying
	/// waiters. Returns the stored snapshot when newly inserted.
	pub fn insert(&self, info: DeviceInfo) -> Option<ClientDevice> {
		let device = match self.devices.entry(info.device_index) {
			Entry::Occupied(_) => return None,
			Entry::Vacant(slot) => {
				let device = ClientDevice {
					index: info.device_index,
					name: info.device_name,
					allowed_messages: info.allowed_messages,
					generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
				};
				slot.insert(device.clone());
				device
			}
		};
		if let Some((_, notify)) = self.waiters.remove(&device.index) {
			notify.notify_waiters();
		}
		Some(device)
	}

	pub fn remove(&self, index: u32) -> Option<ClientDevice> {
		self.devices.remove(&index).map(|(_, device)| device)
	}

	pub fn try_get(&self, index: u32) -> Option<ClientDevice> {
		self.devices.get(&index).map(|r| r.value().clone())
	}

	/// True if `device` is still the live occupant of its index.
	pub fn is_current(&self, device: &ClientDevice) -> bool {
		self.devices
			.get(&device.index)
			.is_some_and(|r| r.generation == device.generation)
	}

	/// All devices, ordered by index.
	pub fn snapshot(&self) -> Vec<ClientDevice> {
		let mut devices: Vec<_> = self.devices.iter().map(|r| r.value().clone()).collect();
		devices.sort_by_key(|d| d.index);
		devices
	}

	pub fn clear(&self) {
		self.devices.clear();
	}

	/// Waits for a device to appear, with timeout.
	pub async fn wait_for(&self, index: u32, timeout: Duration) -> Result<ClientDevice> {
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let notify = self
				.waiters
				.entry(index)
				.or_insert_with(|| Arc::new(Notify::new()))
				.clone();

			let woken = {
				let notified = notify.notified();

				if let Some(device) = self.try_get(index) {
					drop(notified);
					self.release_waiter(index, notify);
					return Ok(device);
				}

				let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
				if remaining.is_zero() {
					false
				} else {
					tokio::select! {
						biased;
						_ = notified => true,
						_ = tokio::time::sleep(remaining) => false,
					}
				}
			};

			if !woken {
				self.release_waiter(index, notify);
				return Err(timeout_error(index));
			}
		}
	}

	/// Drops the waiter entry for `index` unless another caller still waits on it.
	fn release_waiter(&self, index: u32, notify: Arc<Notify>) {
		// One reference is ours and one is the map's.
		self.waiters
			.remove_if(&index, |_, entry| Arc::ptr_eq(entry, &notify) && Arc::strong_count(entry) == 2);
	}

	#[cfg(test)]
	pub(crate) fn waiter_count(&self) -> usize {
		self.waiters.len()
	}
}

fn timeout_error(index: u32) -> Error {
	Error::Timeout(format!("Timeout waiting for device {index}"))
}
