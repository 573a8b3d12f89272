#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::styles::cli_styles;

/// Device control server speaking the hapwire protocol.
#[derive(Parser, Debug)]
#[command(name = "hapwire")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Accept client connections over TCP, one at a time.
	Serve(ServeArgs),
	/// Load the device configuration and print the resulting catalog.
	CheckConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
	/// Base device configuration. Defaults to the built-in catalog.
	#[arg(long, value_name = "FILE")]
	pub device_config: Option<PathBuf>,

	/// User configuration adding devices to known protocols.
	#[arg(long, value_name = "FILE")]
	pub user_device_config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	#[command(flatten)]
	pub config: ConfigArgs,

	/// Address to listen on.
	#[arg(long, value_name = "ADDR", default_value = "127.0.0.1:12345")]
	pub listen: String,

	/// Name announced to clients.
	#[arg(long, value_name = "NAME", default_value = "hapwire server")]
	pub server_name: String,

	/// Ping watchdog window in milliseconds; 0 disables it.
	#[arg(long, value_name = "MS", default_value_t = 0)]
	pub max_ping_time: u64,

	/// Only accept BLE devices whose name matches (repeatable, glob).
	#[arg(long = "whitelist-name", value_name = "PATTERN")]
	pub whitelist_names: Vec<String>,

	/// Never accept BLE devices whose name matches (repeatable, glob).
	#[arg(long = "blacklist-name", value_name = "PATTERN")]
	pub blacklist_names: Vec<String>,

	/// Add a simulated BLE device advertising NAME (repeatable).
	#[arg(long = "simulate-device", value_name = "NAME")]
	pub simulated_devices: Vec<String>,
}
