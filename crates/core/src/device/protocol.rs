//! Protocol encoders and the registry that names them.

use std::fmt;
use std::sync::Arc;

use hapwire_runtime::ConfigurationError;
use indexmap::IndexMap;

use super::hardware::{HardwareDevice, HardwareWrite};
use super::{DeviceHandle, protocols};
use crate::config::BusConfiguration;

/// Turns per-feature vibration state into hardware writes.
pub trait ProtocolHandler: Send {
	/// Number of independently addressable vibration features.
	fn vibrate_feature_count(&self) -> u32;

	/// Encodes the full state vector. `speeds.len()` equals
	/// [`vibrate_feature_count`](Self::vibrate_feature_count).
	fn encode_vibrate(&mut self, speeds: &[f64]) -> Result<Vec<HardwareWrite>, String>;
}

/// Builds a handler for a device, given the name it reported.
pub type ProtocolConstructor = fn(&str) -> Box<dyn ProtocolHandler>;

/// A named protocol implementation.
#[derive(Clone)]
pub struct ProtocolDescriptor {
	name: Arc<str>,
	constructor: ProtocolConstructor,
}

impl ProtocolDescriptor {
	pub fn new(name: &str, constructor: ProtocolConstructor) -> Self {
		Self {
			name: Arc::from(name),
			constructor,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn instantiate(&self, device_name: &str) -> Box<dyn ProtocolHandler> {
		(self.constructor)(device_name)
	}
}

impl fmt::Debug for ProtocolDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProtocolDescriptor")
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

/// Protocol names known to this process, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
	protocols: IndexMap<String, ProtocolDescriptor>,
}

impl ProtocolRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry holding every protocol this crate implements.
	pub fn builtin() -> Self {
		let mut registry = Self::new();
		for (name, constructor) in protocols::BUILTIN {
			registry.protocols.insert(
				(*name).to_string(),
				ProtocolDescriptor::new(name, *constructor),
			);
		}
		registry
	}

	pub fn register(
		&mut self,
		name: &str,
		constructor: ProtocolConstructor,
	) -> Result<(), ConfigurationError> {
		if self.protocols.contains_key(name) {
			return Err(ConfigurationError::DuplicateProtocol(name.to_string()));
		}
		self.protocols
			.insert(name.to_string(), ProtocolDescriptor::new(name, constructor));
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&ProtocolDescriptor> {
		self.protocols.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.protocols.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.protocols.keys().map(String::as_str)
	}
}

/// Result of resolution: the catalog entry that matched and the protocol
/// that will drive the device.
#[derive(Debug, Clone)]
pub struct DeviceFactory {
	pub configuration: BusConfiguration,
	pub descriptor: ProtocolDescriptor,
}

impl DeviceFactory {
	pub fn protocol_name(&self) -> &str {
		self.descriptor.name()
	}

	/// Wraps connected hardware in a device handle speaking this protocol.
	pub fn create(&self, hardware: Arc<dyn HardwareDevice>) -> DeviceHandle {
		let handler = self.descriptor.instantiate(hardware.name());
		DeviceHandle::new(self.descriptor.name(), handler, hardware)
	}
}
