//! Protocol messages.
//!
//! A [`Message`] is serialized as a flat JSON object: the `id` next to the
//! body's `type` tag and its fields.
//!
//! ```json
//! {"id": 3, "type": "vibrate_cmd", "device_index": 0, "speeds": [{"index": 0, "speed": 0.5}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::device::{DeviceCommand, DeviceInfo, VibrateSubcommand};
use crate::log::LogLevel;

/// Message identifier, scoped to one connection.
pub type MessageId = u32;

/// Identifier carried by server-originated events. Never used for correlation.
pub const SYSTEM_ID: MessageId = 0;

/// Message schema version spoken by this crate.
pub const MESSAGE_VERSION: u32 = 1;

/// Category attached to every `Error` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
	Unknown,
	/// Handshake failures (version mismatch, messages before the handshake).
	Init,
	/// Ping watchdog expired.
	Ping,
	/// Malformed or unexpected message.
	Msg,
	/// Device command rejected or failed.
	Device,
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	/// Correlation id; [`SYSTEM_ID`] for events.
	pub id: MessageId,
	#[serde(flatten)]
	pub body: MessageBody,
}

impl Message {
	pub fn new(id: MessageId, body: MessageBody) -> Self {
		Self { id, body }
	}

	/// Builds a server event with the reserved system id.
	pub fn event(body: MessageBody) -> Self {
		Self::new(SYSTEM_ID, body)
	}

	pub fn ok(id: MessageId) -> Self {
		Self::new(id, MessageBody::Ok)
	}

	pub fn error(id: MessageId, class: ErrorClass, message: impl Into<String>) -> Self {
		Self::new(
			id,
			MessageBody::Error {
				class,
				message: message.into(),
			},
		)
	}

	/// Returns true for unsolicited server events, i.e. any message with
	/// id [`SYSTEM_ID`], whatever its body.
	///
	/// An `Error` with id 0 is also an event: the server uses it to announce
	/// session-fatal conditions such as a ping timeout.
	pub fn is_event(&self) -> bool {
		self.id == SYSTEM_ID
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	pub fn from_json(text: &str) -> serde_json::Result<Self> {
		serde_json::from_str(text)
	}
}

/// Closed set of message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
	Ok,
	Error {
		class: ErrorClass,
		message: String,
	},
	/// First message of every session.
	RequestServerInfo {
		client_name: String,
		message_version: u32,
	},
	ServerInfo {
		server_name: String,
		message_version: u32,
		/// Watchdog window in milliseconds, 0 when disabled.
		max_ping_time: u32,
	},
	Ping,
	StartScanning,
	StopScanning,
	ScanningFinished,
	RequestDeviceList,
	DeviceList {
		devices: Vec<DeviceInfo>,
	},
	DeviceAdded(DeviceInfo),
	DeviceRemoved {
		device_index: u32,
	},
	RequestLog {
		level: LogLevel,
	},
	Log {
		level: LogLevel,
		message: String,
	},
	StopAllDevices,
	StopDeviceCmd {
		device_index: u32,
	},
	SingleMotorVibrateCmd {
		device_index: u32,
		speed: f64,
	},
	VibrateCmd {
		device_index: u32,
		speeds: Vec<VibrateSubcommand>,
	},
}

impl MessageBody {
	/// Protocol name of this kind, as used in logs and error texts.
	pub fn name(&self) -> &'static str {
		match self {
			MessageBody::Ok => "Ok",
			MessageBody::Error { .. } => "Error",
			MessageBody::RequestServerInfo { .. } => "RequestServerInfo",
			MessageBody::ServerInfo { .. } => "ServerInfo",
			MessageBody::Ping => "Ping",
			MessageBody::StartScanning => "StartScanning",
			MessageBody::StopScanning => "StopScanning",
			MessageBody::ScanningFinished => "ScanningFinished",
			MessageBody::RequestDeviceList => "RequestDeviceList",
			MessageBody::DeviceList { .. } => "DeviceList",
			MessageBody::DeviceAdded(_) => "DeviceAdded",
			MessageBody::DeviceRemoved { .. } => "DeviceRemoved",
			MessageBody::RequestLog { .. } => "RequestLog",
			MessageBody::Log { .. } => "Log",
			MessageBody::StopAllDevices => "StopAllDevices",
			MessageBody::StopDeviceCmd { .. } => "StopDeviceCmd",
			MessageBody::SingleMotorVibrateCmd { .. } => "SingleMotorVibrateCmd",
			MessageBody::VibrateCmd { .. } => "VibrateCmd",
		}
	}

	/// Splits a device command body into its target index and command.
	///
	/// Returns the body unchanged in `Err` for every non-device kind.
	pub fn into_device_command(self) -> Result<(u32, DeviceCommand), MessageBody> {
		match self {
			MessageBody::StopDeviceCmd { device_index } => Ok((device_index, DeviceCommand::Stop)),
			MessageBody::SingleMotorVibrateCmd {
				device_index,
				speed,
			} => Ok((device_index, DeviceCommand::SingleMotorVibrate(speed))),
			MessageBody::VibrateCmd {
				device_index,
				speeds,
			} => Ok((device_index, DeviceCommand::Vibrate(speeds))),
			other => Err(other),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::{AllowedMessages, DeviceCommandKind, MessageAttributes};

	#[test]
	fn message_serializes_flat() {
		let message = Message::new(
			3,
			MessageBody::VibrateCmd {
				device_index: 4,
				speeds: vec![VibrateSubcommand::new(0, 0.5)],
			},
		);
		let value = serde_json::to_value(&message).unwrap();

		assert_eq!(value["id"], 3);
		assert_eq!(value["type"], "vibrate_cmd");
		assert_eq!(value["device_index"], 4);
		assert_eq!(value["speeds"][0]["index"], 0);
		assert_eq!(value["speeds"][0]["speed"], 0.5);
	}

	#[test]
	fn device_added_parses() {
		let json = r#"{
			"id": 0,
			"type": "device_added",
			"device_index": 2,
			"device_name": "Fuse",
			"allowed_messages": {
				"stop_device_cmd": {},
				"vibrate_cmd": {"feature_count": 2}
			}
		}"#;
		let message = Message::from_json(json).unwrap();
		assert!(message.is_event());

		match message.body {
			MessageBody::DeviceAdded(info) => {
				assert_eq!(info.device_index, 2);
				assert_eq!(info.device_name, "Fuse");
				assert_eq!(
					info.allowed_messages.get(&DeviceCommandKind::VibrateCmd),
					Some(&MessageAttributes::with_feature_count(2))
				);
				assert_eq!(
					info.allowed_messages.get(&DeviceCommandKind::StopDeviceCmd),
					Some(&MessageAttributes::default())
				);
			}
			other => panic!("Expected DeviceAdded, got {other:?}"),
		}
	}

	#[test]
	fn unit_variants_round_trip_through_text() {
		let text = Message::new(7, MessageBody::Ping).to_json().unwrap();
		assert_eq!(text, r#"{"id":7,"type":"ping"}"#);
		assert_eq!(Message::from_json(&text).unwrap(), Message::new(7, MessageBody::Ping));
	}

	#[test]
	fn error_reply_carries_class() {
		let json = r#"{"id": 9, "type": "error", "class": "device", "message": "no such device"}"#;
		let message = Message::from_json(json).unwrap();
		assert_eq!(message, Message::error(9, ErrorClass::Device, "no such device"));
	}

	#[test]
	fn event_classification_depends_only_on_id() {
		assert!(Message::event(MessageBody::ScanningFinished).is_event());
		assert!(Message::error(SYSTEM_ID, ErrorClass::Ping, "Ping timed out.").is_event());
		assert!(Message::new(SYSTEM_ID, MessageBody::Ok).is_event());
		assert!(!Message::new(4, MessageBody::ScanningFinished).is_event());
	}

	#[test]
	fn negative_feature_index_is_rejected_at_parse_time() {
		let json = r#"{"id": 1, "type": "vibrate_cmd", "device_index": 0, "speeds": [{"index": -1, "speed": 0.5}]}"#;
		assert!(Message::from_json(json).is_err());
	}

	#[test]
	fn device_command_split() {
		let body = MessageBody::SingleMotorVibrateCmd {
			device_index: 1,
			speed: 0.25,
		};
		let (index, command) = body.into_device_command().unwrap();
		assert_eq!(index, 1);
		assert_eq!(command, DeviceCommand::SingleMotorVibrate(0.25));

		assert!(MessageBody::Ping.into_device_command().is_err());
	}

	#[test]
	fn unknown_type_is_rejected() {
		let json = r#"{"id": 1, "type": "launch_rocket"}"#;
		assert!(Message::from_json(json).is_err());
	}

	#[test]
	fn allowed_messages_serialize_in_stable_order() {
		let mut allowed = AllowedMessages::new();
		allowed.insert(
			DeviceCommandKind::VibrateCmd,
			MessageAttributes::with_feature_count(1),
		);
		allowed.insert(DeviceCommandKind::StopDeviceCmd, MessageAttributes::default());
		let text = serde_json::to_string(&allowed).unwrap();
		assert_eq!(
			text,
			r#"{"stop_device_cmd":{},"vibrate_cmd":{"feature_count":1}}"#
		);
	}
}
