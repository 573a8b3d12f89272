//! Transport-specific matching descriptors.
//!
//! A [`BusConfiguration`] plays two roles: catalog and filter entries hold
//! name/port *patterns*, discovered candidates hold the concrete values seen
//! on the bus. Matching always reads `entry.matches(candidate)`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Transport category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
	Btle,
	Usb,
	Hid,
	Serial,
}

impl BusKind {
	pub fn as_str(self) -> &'static str {
		match self {
			BusKind::Btle => "btle",
			BusKind::Usb => "usb",
			BusKind::Hid => "hid",
			BusKind::Serial => "serial",
		}
	}
}

impl fmt::Display for BusKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Compiled glob pattern for device names and port names.
///
/// Compiles once; invalid patterns fall back to exact matching.
#[derive(Clone)]
pub struct NamePattern {
	raw: String,
	pattern: Option<glob::Pattern>,
}

impl NamePattern {
	pub fn new(pattern: &str) -> Self {
		Self {
			raw: pattern.to_string(),
			pattern: glob::Pattern::new(pattern).ok(),
		}
	}

	/// Exact-match pattern for a concrete name reported by a bus.
	pub fn literal(name: &str) -> Self {
		Self {
			raw: name.to_string(),
			pattern: glob::Pattern::new(&glob::Pattern::escape(name)).ok(),
		}
	}

	pub fn is_match(&self, name: &str) -> bool {
		match &self.pattern {
			Some(pattern) => pattern.matches(name),
			None => self.raw == name,
		}
	}

	fn accepts(&self, other: &NamePattern) -> bool {
		self.is_match(&other.raw)
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}
}

impl PartialEq for NamePattern {
	fn eq(&self, other: &Self) -> bool {
		self.as_str() == other.as_str()
	}
}

impl Eq for NamePattern {}

impl fmt::Debug for NamePattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("NamePattern").field(&self.as_str()).finish()
	}
}

impl Serialize for NamePattern {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for NamePattern {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(NamePattern::new(&raw))
	}
}

/// Endpoint name → characteristic id, for one BLE service.
pub type CharacteristicMap = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BleConfiguration {
	#[serde(default)]
	pub names: Vec<NamePattern>,
	/// Service id → endpoint map.
	#[serde(default)]
	pub services: IndexMap<String, CharacteristicMap>,
}

impl BleConfiguration {
	/// Candidate description of an advertising peripheral.
	pub fn advertised(name: &str, services: &[&str]) -> Self {
		Self {
			names: vec![NamePattern::literal(name)],
			services: services
				.iter()
				.map(|s| (s.to_ascii_lowercase(), CharacteristicMap::new()))
				.collect(),
		}
	}

	fn matches(&self, candidate: &BleConfiguration) -> bool {
		if !self.names.is_empty() {
			return self
				.names
				.iter()
				.any(|pattern| candidate.names.iter().any(|name| pattern.accepts(name)));
		}

		self.services.keys().any(|service| {
			candidate
				.services
				.keys()
				.any(|other| other.eq_ignore_ascii_case(service))
		})
	}

	fn merge(&mut self, other: &BleConfiguration) {
		union_into(&mut self.names, &other.names);
		for (service, characteristics) in &other.services {
			let existing = self.services.entry(service.clone()).or_default();
			for (endpoint, id) in characteristics {
				existing
					.entry(endpoint.clone())
					.or_insert_with(|| id.clone());
			}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VendorProduct {
	pub vendor_id: u16,
	pub product_id: u16,
}

impl VendorProduct {
	pub fn new(vendor_id: u16, product_id: u16) -> Self {
		Self {
			vendor_id,
			product_id,
		}
	}
}

/// USB and HID descriptor: a set of vendor/product id pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VendorProductConfiguration {
	pub pairs: Vec<VendorProduct>,
}

impl VendorProductConfiguration {
	pub fn single(vendor_id: u16, product_id: u16) -> Self {
		Self {
			pairs: vec![VendorProduct::new(vendor_id, product_id)],
		}
	}

	fn matches(&self, candidate: &VendorProductConfiguration) -> bool {
		self.pairs.iter().any(|pair| candidate.pairs.contains(pair))
	}

	fn merge(&mut self, other: &VendorProductConfiguration) {
		union_into(&mut self.pairs, &other.pairs);
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SerialConfiguration {
	pub ports: Vec<NamePattern>,
	#[serde(default = "default_baud_rate")]
	pub baud_rate: u32,
	#[serde(default = "default_data_bits")]
	pub data_bits: u8,
	#[serde(default = "default_stop_bits")]
	pub stop_bits: u8,
	#[serde(default = "default_parity")]
	pub parity: String,
}

fn default_baud_rate() -> u32 {
	9600
}

fn default_data_bits() -> u8 {
	8
}

fn default_stop_bits() -> u8 {
	1
}

fn default_parity() -> String {
	"N".to_string()
}

impl SerialConfiguration {
	/// Candidate description of an enumerated port.
	pub fn port(name: &str) -> Self {
		Self {
			ports: vec![NamePattern::literal(name)],
			baud_rate: default_baud_rate(),
			data_bits: default_data_bits(),
			stop_bits: default_stop_bits(),
			parity: default_parity(),
		}
	}

	fn matches(&self, candidate: &SerialConfiguration) -> bool {
		self.ports
			.iter()
			.any(|pattern| candidate.ports.iter().any(|port| pattern.accepts(port)))
	}

	fn merge(&mut self, other: &SerialConfiguration) {
		union_into(&mut self.ports, &other.ports);
	}
}

/// One matching descriptor, tagged by bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusConfiguration {
	Btle(BleConfiguration),
	Usb(VendorProductConfiguration),
	Hid(VendorProductConfiguration),
	Serial(SerialConfiguration),
}

impl BusConfiguration {
	pub fn kind(&self) -> BusKind {
		match self {
			BusConfiguration::Btle(_) => BusKind::Btle,
			BusConfiguration::Usb(_) => BusKind::Usb,
			BusConfiguration::Hid(_) => BusKind::Hid,
			BusConfiguration::Serial(_) => BusKind::Serial,
		}
	}

	/// Compares like-typed descriptors; different buses never match.
	pub fn matches(&self, candidate: &BusConfiguration) -> bool {
		match (self, candidate) {
			(BusConfiguration::Btle(a), BusConfiguration::Btle(b)) => a.matches(b),
			(BusConfiguration::Usb(a), BusConfiguration::Usb(b)) => a.matches(b),
			(BusConfiguration::Hid(a), BusConfiguration::Hid(b)) => a.matches(b),
			(BusConfiguration::Serial(a), BusConfiguration::Serial(b)) => a.matches(b),
			_ => false,
		}
	}

	/// Folds `other`'s identifying fields into `self` when both share a bus.
	///
	/// Returns false (and leaves `self` untouched) for different buses.
	pub fn merge(&mut self, other: &BusConfiguration) -> bool {
		match (self, other) {
			(BusConfiguration::Btle(a), BusConfiguration::Btle(b)) => a.merge(b),
			(BusConfiguration::Usb(a), BusConfiguration::Usb(b)) => a.merge(b),
			(BusConfiguration::Hid(a), BusConfiguration::Hid(b)) => a.merge(b),
			(BusConfiguration::Serial(a), BusConfiguration::Serial(b)) => a.merge(b),
			_ => return false,
		}
		true
	}

	/// Short human-readable identity, for logs.
	pub fn describe(&self) -> String {
		match self {
			BusConfiguration::Btle(c) => format!(
				"btle[{}]",
				c.names
					.iter()
					.map(NamePattern::as_str)
					.collect::<Vec<_>>()
					.join(",")
			),
			BusConfiguration::Usb(c) | BusConfiguration::Hid(c) => format!(
				"{}[{}]",
				self.kind(),
				c.pairs
					.iter()
					.map(|p| format!("{:04x}:{:04x}", p.vendor_id, p.product_id))
					.collect::<Vec<_>>()
					.join(",")
			),
			BusConfiguration::Serial(c) => format!(
				"serial[{}]",
				c.ports
					.iter()
					.map(NamePattern::as_str)
					.collect::<Vec<_>>()
					.join(",")
			),
		}
	}
}

fn union_into<T: Clone + PartialEq>(target: &mut Vec<T>, extra: &[T]) {
	for item in extra {
		if !target.contains(item) {
			target.push(item.clone());
		}
	}
}
