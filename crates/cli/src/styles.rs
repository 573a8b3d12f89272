//! Terminal colors shared by `--help` and the `check-config` report.

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use colored::{ColoredString, Colorize};

/// Help palette. Invalid values and parse errors get their own colors so a
/// bad `--max-ping-time` stands out from the usage text.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.error(AnsiColor::Red.on_default().bold())
		.invalid(AnsiColor::Yellow.on_default().bold())
}

/// Whether a catalog protocol has an encoder compiled in.
pub fn protocol_status(implemented: bool) -> ColoredString {
	if implemented {
		"implemented".green()
	} else {
		"no handler".yellow()
	}
}

pub fn error_label() -> ColoredString {
	"error:".red().bold()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_labels_read_without_color() {
		colored::control::set_override(false);
		assert_eq!(protocol_status(true).to_string(), "implemented");
		assert_eq!(protocol_status(false).to_string(), "no handler");
		assert_eq!(error_label().to_string(), "error:");
		colored::control::unset_override();
	}
}
