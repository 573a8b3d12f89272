//! Error types shared by every hapwire layer.

use hapwire_protocol::{DeviceCommandKind, ErrorClass};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a hapwire client or server.
#[derive(Debug, Error)]
pub enum Error {
	/// Catalog or filter registration failed.
	#[error("Configuration error: {0}")]
	Configuration(#[from] ConfigurationError),

	/// A device command was rejected or failed. The session continues.
	#[error("Device command error: {0}")]
	DeviceCommand(#[from] DeviceCommandError),

	/// The peer speaks an incompatible message version. Fatal to the session.
	#[error("Message version {version} is below the supported minimum {minimum}")]
	ProtocolVersion { version: u32, minimum: u32 },

	/// No ping arrived inside the negotiated window. Fatal to the session.
	#[error("Ping timed out")]
	PingTimeout,

	/// The connection was lost.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Malformed or unexpected protocol traffic.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// Error reply received from the remote peer.
	#[error("{class:?} error from server: {message}")]
	Remote { class: ErrorClass, message: String },

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// The caller cancelled the request before a reply arrived.
	#[error("Request cancelled")]
	Cancelled,

	/// Operation requires a connected session.
	#[error("Not connected")]
	NotConnected,

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Catalog load and registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
	#[error("base configuration already loaded; reset first")]
	AlreadyLoaded,

	#[error("base configuration must be loaded before user configuration")]
	NotLoaded,

	#[error("user configuration cannot add protocol '{0}'")]
	UnknownProtocol(String),

	#[error("protocol '{0}' registered twice")]
	DuplicateProtocol(String),

	#[error("protocol '{protocol}' uses unknown bus '{bus}'")]
	UnknownBus { protocol: String, bus: String },

	#[error("malformed configuration: {0}")]
	Parse(String),
}

/// Per-command failures, reported to the caller only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceCommandError {
	#[error("device {0} is not available")]
	DeviceNotAvailable(u32),

	#[error("device {index} does not accept {kind}")]
	UnsupportedCommand { index: u32, kind: DeviceCommandKind },

	#[error("command carries {count} subcommands, device accepts 1 to {feature_count}")]
	CountOutOfRange { count: usize, feature_count: u32 },

	#[error("feature index {index} is out of bounds for a device with {feature_count} features")]
	IndexOutOfRange { index: u32, feature_count: u32 },

	#[error("encoding failed: {0}")]
	Encode(String),

	#[error("device write failed: {0}")]
	Hardware(String),
}

impl Error {
	/// Wire error class used when this error is reported to a client.
	pub fn class(&self) -> ErrorClass {
		match self {
			Error::DeviceCommand(_) => ErrorClass::Device,
			Error::ProtocolVersion { .. } => ErrorClass::Init,
			Error::PingTimeout => ErrorClass::Ping,
			Error::Protocol(_) | Error::Json(_) => ErrorClass::Msg,
			Error::Remote { class, .. } => *class,
			_ => ErrorClass::Unknown,
		}
	}

	/// Returns true for errors that end the session.
	pub fn is_session_fatal(&self) -> bool {
		matches!(
			self,
			Error::ProtocolVersion { .. }
				| Error::PingTimeout
				| Error::Transport(_)
				| Error::ChannelClosed
		) || matches!(self, Error::Remote { class, .. } if matches!(class, ErrorClass::Ping | ErrorClass::Init))
	}

	/// Returns the remote error class if this is a server reply.
	pub fn remote_class(&self) -> Option<ErrorClass> {
		match self {
			Error::Remote { class, .. } => Some(*class),
			_ => None,
		}
	}
}
