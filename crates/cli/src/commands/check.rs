use anyhow::Result;
use colored::Colorize;
use hapwire::config::BusConfiguration;

use crate::catalog;
use crate::cli::ConfigArgs;
use crate::styles;

pub fn run(args: &ConfigArgs) -> Result<()> {
	let manager = catalog::load(args)?;
	let registry = manager.registry();

	for (protocol, entries) in manager.catalog_snapshot() {
		let status = styles::protocol_status(registry.contains(&protocol));
		println!("{} ({status})", protocol.bold());

		if entries.is_empty() {
			println!("  {}", "no devices".dimmed());
		}
		for entry in &entries {
			println!("  {}", describe(entry));
		}
	}

	println!("{}", "Configuration OK".green().bold());
	Ok(())
}

fn describe(entry: &BusConfiguration) -> String {
	match entry {
		BusConfiguration::Btle(ble) if !ble.services.is_empty() => format!(
			"{} services={}",
			entry.describe(),
			ble.services.keys().cloned().collect::<Vec<_>>().join(",")
		),
		BusConfiguration::Serial(serial) => format!(
			"{} {}/{}{}{}",
			entry.describe(),
			serial.baud_rate,
			serial.data_bits,
			serial.parity,
			serial.stop_bits
		),
		_ => entry.describe(),
	}
}
