//! JSON device-configuration documents.
//!
//! ```json
//! {
//!   "protocols": {
//!     "kiiroo-v2-vibrator": {
//!       "btle": { "names": ["Pearl2", "Fuse"], "services": { "<uuid>": { "tx": "<uuid>" } } }
//!     },
//!     "xinput": null
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::bus::{
	BleConfiguration, BusConfiguration, SerialConfiguration, VendorProductConfiguration,
};
use hapwire_runtime::ConfigurationError;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
	protocols: IndexMap<String, Option<IndexMap<String, Value>>>,
}

/// Parsed configuration document: protocol name → matching descriptors,
/// in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationDefinition {
	pub protocols: IndexMap<String, Vec<BusConfiguration>>,
}

impl ConfigurationDefinition {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds descriptors for `protocol`, appending to any already present.
	pub fn with_protocol(
		mut self,
		protocol: impl Into<String>,
		entries: impl IntoIterator<Item = BusConfiguration>,
	) -> Self {
		self.protocols
			.entry(protocol.into())
			.or_default()
			.extend(entries);
		self
	}

	/// Parses a document. A protocol whose body is `null` is kept as a name
	/// with no descriptors.
	pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
		let raw: RawDefinition = serde_json::from_str(text)
			.map_err(|e| ConfigurationError::Parse(e.to_string()))?;

		let mut protocols = IndexMap::with_capacity(raw.protocols.len());
		for (name, body) in raw.protocols {
			let mut entries = Vec::new();
			for (bus, value) in body.into_iter().flatten() {
				entries.push(parse_bus(&name, &bus, value)?);
			}
			protocols.insert(name, entries);
		}
		Ok(Self { protocols })
	}
}

fn parse_bus(protocol: &str, bus: &str, value: Value) -> Result<BusConfiguration, ConfigurationError> {
	let parse_error =
		|e: serde_json::Error| ConfigurationError::Parse(format!("protocol '{protocol}' bus '{bus}': {e}"));

	match bus {
		"btle" => serde_json::from_value::<BleConfiguration>(value)
			.map(BusConfiguration::Btle)
			.map_err(parse_error),
		"usb" => serde_json::from_value::<VendorProductConfiguration>(value)
			.map(BusConfiguration::Usb)
			.map_err(parse_error),
		"hid" => serde_json::from_value::<VendorProductConfiguration>(value)
			.map(BusConfiguration::Hid)
			.map_err(parse_error),
		"serial" => serde_json::from_value::<SerialConfiguration>(value)
			.map(BusConfiguration::Serial)
			.map_err(parse_error),
		other => Err(ConfigurationError::UnknownBus {
			protocol: protocol.to_string(),
			bus: other.to_string(),
		}),
	}
}
