use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_serve_defaults() {
	let cli = Cli::try_parse_from(["hapwire", "serve"]).unwrap();

	match cli.command {
		Commands::Serve(args) => {
			assert_eq!(args.listen, "127.0.0.1:12345");
			assert_eq!(args.server_name, "hapwire server");
			assert_eq!(args.max_ping_time, 0);
			assert!(args.config.device_config.is_none());
			assert!(args.whitelist_names.is_empty());
		}
		_ => panic!("Expected Serve command"),
	}
}

#[test]
fn parse_serve_with_filters_and_simulated_devices() {
	let args = vec![
		"hapwire",
		"-vv",
		"serve",
		"--device-config",
		"/etc/hapwire/devices.json",
		"--max-ping-time",
		"1000",
		"--whitelist-name",
		"Fuse",
		"--whitelist-name",
		"Pearl*",
		"--blacklist-name",
		"Titan",
		"--simulate-device",
		"Fuse",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	assert_eq!(cli.verbose, 2);
	match cli.command {
		Commands::Serve(args) => {
			assert_eq!(
				args.config.device_config,
				Some(PathBuf::from("/etc/hapwire/devices.json"))
			);
			assert_eq!(args.max_ping_time, 1000);
			assert_eq!(args.whitelist_names, ["Fuse", "Pearl*"]);
			assert_eq!(args.blacklist_names, ["Titan"]);
			assert_eq!(args.simulated_devices, ["Fuse"]);
		}
		_ => panic!("Expected Serve command"),
	}
}

#[test]
fn parse_check_config() {
	let cli = Cli::try_parse_from([
		"hapwire",
		"check-config",
		"--user-device-config",
		"user.json",
	])
	.unwrap();

	match cli.command {
		Commands::CheckConfig(args) => {
			assert!(args.device_config.is_none());
			assert_eq!(args.user_device_config, Some(PathBuf::from("user.json")));
		}
		_ => panic!("Expected CheckConfig command"),
	}
}

#[test]
fn reject_non_numeric_ping_time() {
	let result = Cli::try_parse_from(["hapwire", "serve", "--max-ping-time", "soon"]);
	assert!(result.is_err());
}
