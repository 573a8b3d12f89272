//! Device catalog and protocol resolution.
//!
//! The catalog maps protocol names to the bus descriptors that identify
//! devices speaking them. It is loaded once from a base definition and may be
//! extended by a user definition, which can add descriptors to existing
//! protocols but never introduce new protocol names.
//!
//! # Resolution
//!
//! 1. A non-empty whitelist must contain an entry matching the candidate
//! 2. No blacklist entry may match the candidate
//! 3. Catalog entries are scanned in insertion order; the first match wins
//! 4. A match whose protocol has no implementation ends the scan with no result

mod bus;
mod definition;


use hapwire_runtime::ConfigurationError;
use indexmap::IndexMap;
use parking_lot::RwLock;

pub use bus::{
	BleConfiguration, BusConfiguration, BusKind, CharacteristicMap, NamePattern,
	SerialConfiguration, VendorProduct, VendorProductConfiguration,
};
pub use definition::ConfigurationDefinition;

use crate::device::{DeviceFactory, ProtocolRegistry};

#[derive(Debug, Default)]
struct Catalog {
	loaded: bool,
	protocols: IndexMap<String, Vec<BusConfiguration>>,
	whitelist: Vec<BusConfiguration>,
	blacklist: Vec<BusConfiguration>,
}

impl Catalog {
	/// Merges `entry` into the first same-bus entry of `protocol`, then
	/// appends it as well. Resolution order is unaffected since the merged
	/// entry sits earlier.
	fn add_protocol_config(&mut self, protocol: &str, entry: BusConfiguration) {
		let entries = self.protocols.entry(protocol.to_string()).or_default();
		if let Some(existing) = entries.iter_mut().find(|e| e.kind() == entry.kind()) {
			existing.merge(&entry);
		}
		entries.push(entry);
	}
}

/// Shared catalog plus whitelist/blacklist filters.
#[derive(Debug)]
pub struct DeviceConfigurationManager {
	registry: ProtocolRegistry,
	catalog: RwLock<Catalog>,
}

impl DeviceConfigurationManager {
	pub fn new(registry: ProtocolRegistry) -> Self {
		Self {
			registry,
			catalog: RwLock::new(Catalog::default()),
		}
	}

	pub fn registry(&self) -> &ProtocolRegistry {
		&self.registry
	}

	pub fn is_loaded(&self) -> bool {
		self.catalog.read().loaded
	}

	pub fn load_base(&self, definition: ConfigurationDefinition) -> Result<(), ConfigurationError> {
		let mut catalog = self.catalog.write();
		if catalog.loaded {
			return Err(ConfigurationError::AlreadyLoaded);
		}

		let mut entry_count = 0;
		for (protocol, entries) in definition.protocols {
			catalog.protocols.entry(protocol.clone()).or_default();
			for entry in entries {
				catalog.add_protocol_config(&protocol, entry);
				entry_count += 1;
			}
		}
		catalog.loaded = true;

		tracing::info!(
			target = "hapwire.config",
			protocols = catalog.protocols.len(),
			entries = entry_count,
			"Loaded base device configuration"
		);
		Ok(())
	}

	pub fn load_base_json(&self, text: &str) -> Result<(), ConfigurationError> {
		self.load_base(ConfigurationDefinition::from_json(text)?)
	}

	/// Adds descriptors to protocols the base definition already names.
	///
	/// Fails without applying anything if any protocol is unknown.
	pub fn extend_user(&self, definition: ConfigurationDefinition) -> Result<(), ConfigurationError> {
		let mut catalog = self.catalog.write();
		if !catalog.loaded {
			return Err(ConfigurationError::NotLoaded);
		}
		if let Some(unknown) = definition
			.protocols
			.keys()
			.find(|name| !catalog.protocols.contains_key(*name))
		{
			return Err(ConfigurationError::UnknownProtocol(unknown.clone()));
		}

		for (protocol, entries) in definition.protocols {
			for entry in entries {
				tracing::debug!(target = "hapwire.config", protocol = %protocol, entry = %entry.describe(), "Adding user device configuration");
				catalog.add_protocol_config(&protocol, entry);
			}
		}
		Ok(())
	}

	pub fn extend_user_json(&self, text: &str) -> Result<(), ConfigurationError> {
		self.extend_user(ConfigurationDefinition::from_json(text)?)
	}

	/// Clears the catalog and both filters.
	pub fn reset(&self) {
		*self.catalog.write() = Catalog::default();
	}

	pub fn add_whitelist(&self, entry: BusConfiguration) {
		self.catalog.write().whitelist.push(entry);
	}

	pub fn add_blacklist(&self, entry: BusConfiguration) {
		self.catalog.write().blacklist.push(entry);
	}

	/// Finds the protocol for a discovered device, honoring the filters.
	pub fn resolve(&self, candidate: &BusConfiguration) -> Option<DeviceFactory> {
		let catalog = self.catalog.read();

		if !catalog.whitelist.is_empty() && !catalog.whitelist.iter().any(|e| e.matches(candidate)) {
			tracing::debug!(target = "hapwire.config", candidate = %candidate.describe(), "Device not in whitelist");
			return None;
		}
		if catalog.blacklist.iter().any(|e| e.matches(candidate)) {
			tracing::debug!(target = "hapwire.config", candidate = %candidate.describe(), "Device is blacklisted");
			return None;
		}

		for (protocol, entries) in &catalog.protocols {
			let Some(entry) = entries.iter().find(|e| e.matches(candidate)) else {
				continue;
			};
			let Some(descriptor) = self.registry.get(protocol) else {
				tracing::warn!(target = "hapwire.config", protocol = %protocol, candidate = %candidate.describe(), "Matched protocol has no implementation");
				return None;
			};
			tracing::debug!(target = "hapwire.config", protocol = %protocol, candidate = %candidate.describe(), "Resolved device protocol");
			return Some(DeviceFactory {
				configuration: entry.clone(),
				descriptor: descriptor.clone(),
			});
		}
		None
	}

	/// Every implemented catalog entry for one bus, for discovery
	/// collaborators that need to know what to look for.
	pub fn factories_for_bus(&self, kind: BusKind) -> Vec<DeviceFactory> {
		let catalog = self.catalog.read();
		catalog
			.protocols
			.iter()
			.filter_map(|(protocol, entries)| {
				self.registry
					.get(protocol)
					.map(|descriptor| (descriptor, entries))
			})
			.flat_map(|(descriptor, entries)| {
				entries
					.iter()
					.filter(move |e| e.kind() == kind)
					.map(move |e| DeviceFactory {
						configuration: e.clone(),
						descriptor: descriptor.clone(),
					})
			})
			.collect()
	}

	/// Copy of the catalog, in resolution order.
	pub fn catalog_snapshot(&self) -> IndexMap<String, Vec<BusConfiguration>> {
		self.catalog.read().protocols.clone()
	}
}
