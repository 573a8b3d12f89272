//! Builds the device configuration from files on disk or the bundled catalog.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hapwire::config::{BleConfiguration, BusConfiguration, NamePattern};
use hapwire::{DeviceConfigurationManager, ProtocolRegistry};

use crate::cli::ConfigArgs;

/// Catalog used when `--device-config` is not given.
pub const BUNDLED_CATALOG: &str = include_str!("../assets/devices.json");

pub fn load(args: &ConfigArgs) -> Result<Arc<DeviceConfigurationManager>> {
	let manager = DeviceConfigurationManager::new(ProtocolRegistry::builtin());

	match &args.device_config {
		Some(path) => {
			let text = read(path)?;
			manager
				.load_base_json(&text)
				.with_context(|| format!("Invalid device configuration {}", path.display()))?;
		}
		None => manager
			.load_base_json(BUNDLED_CATALOG)
			.context("Bundled device configuration is invalid")?,
	}

	if let Some(path) = &args.user_device_config {
		let text = read(path)?;
		manager
			.extend_user_json(&text)
			.with_context(|| format!("Invalid user device configuration {}", path.display()))?;
	}

	Ok(Arc::new(manager))
}

/// BLE name filter entry for `--whitelist-name` / `--blacklist-name`.
pub fn name_filter(pattern: &str) -> BusConfiguration {
	BusConfiguration::Btle(BleConfiguration {
		names: vec![NamePattern::new(pattern)],
		..Default::default()
	})
}

fn read(path: &Path) -> Result<String> {
	std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
	use hapwire::config::BusKind;

	use super::*;

	#[test]
	fn bundled_catalog_resolves_known_devices() {
		let manager = load(&ConfigArgs {
			device_config: None,
			user_device_config: None,
		})
		.unwrap();

		let fuse = BusConfiguration::Btle(BleConfiguration::advertised("Fuse", &[]));
		assert_eq!(
			manager.resolve(&fuse).unwrap().protocol_name(),
			"kiiroo-v2-vibrator"
		);
		assert_eq!(manager.factories_for_bus(BusKind::Btle).len(), 2);
	}

	#[test]
	fn whitelist_filter_rejects_other_names() {
		let manager = load(&ConfigArgs {
			device_config: None,
			user_device_config: None,
		})
		.unwrap();
		manager.add_whitelist(name_filter("Pearl*"));

		let fuse = BusConfiguration::Btle(BleConfiguration::advertised("Fuse", &[]));
		let pearl = BusConfiguration::Btle(BleConfiguration::advertised("Pearl2", &[]));
		assert!(manager.resolve(&fuse).is_none());
		assert!(manager.resolve(&pearl).is_some());
	}

	#[test]
	fn missing_file_names_the_path() {
		let err = load(&ConfigArgs {
			device_config: Some("/nonexistent/devices.json".into()),
			user_device_config: None,
		})
		.unwrap_err();
		assert!(err.to_string().contains("/nonexistent/devices.json"));
	}
}
