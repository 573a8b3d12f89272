use serde::{Deserialize, Serialize};

/// Log levels understood by `RequestLog`, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
	Off,
	Fatal,
	Error,
	Warn,
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	/// Returns true if an entry at `entry` passes a filter set to `self`.
	pub fn admits(self, entry: LogLevel) -> bool {
		self != LogLevel::Off && entry != LogLevel::Off && entry <= self
	}
}

impl std::str::FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"off" => Ok(LogLevel::Off),
			"fatal" => Ok(LogLevel::Fatal),
			"error" => Ok(LogLevel::Error),
			"warn" => Ok(LogLevel::Warn),
			"info" => Ok(LogLevel::Info),
			"debug" => Ok(LogLevel::Debug),
			"trace" => Ok(LogLevel::Trace),
			other => Err(format!("unknown log level: {other}")),
		}
	}
}

/// A forwarded log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	pub level: LogLevel,
	pub message: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filter_admits_less_verbose_levels() {
		assert!(LogLevel::Info.admits(LogLevel::Warn));
		assert!(LogLevel::Info.admits(LogLevel::Info));
		assert!(!LogLevel::Info.admits(LogLevel::Debug));
		assert!(!LogLevel::Off.admits(LogLevel::Fatal));
	}

	#[test]
	fn parses_case_insensitively() {
		assert_eq!("Debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
		assert!("loud".parse::<LogLevel>().is_err());
	}
}
