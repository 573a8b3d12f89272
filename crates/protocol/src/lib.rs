//! Wire types for the hapwire device control protocol.
//!
//! Every frame exchanged between a client and a server carries one [`Message`]:
//! an integer id plus a tagged [`MessageBody`]. Requests are correlated with
//! their replies through the id; id [`SYSTEM_ID`] is reserved for unsolicited
//! server events.
//!
//! # Main Types
//!
//! - [`Message`] / [`MessageBody`] - the closed set of commands, replies and events
//! - [`DeviceInfo`] / [`AllowedMessages`] - device descriptions carried by device events
//! - [`DeviceCommand`] - the per-device command subset, as dispatched by a device handle
//! - [`LogLevel`] / [`LogEntry`] - log forwarding payloads

pub mod device;
pub mod log;
pub mod message;

pub use device::{
	AllowedMessages, DeviceCommand, DeviceCommandKind, DeviceInfo, MessageAttributes,
	VibrateSubcommand,
};
pub use log::{LogEntry, LogLevel};
pub use message::{ErrorClass, MESSAGE_VERSION, Message, MessageBody, MessageId, SYSTEM_ID};
