//! Device descriptions and device command payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::MessageBody;

/// Command kinds a device may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommandKind {
	StopDeviceCmd,
	SingleMotorVibrateCmd,
	VibrateCmd,
}

impl DeviceCommandKind {
	pub fn as_str(self) -> &'static str {
		match self {
			DeviceCommandKind::StopDeviceCmd => "StopDeviceCmd",
			DeviceCommandKind::SingleMotorVibrateCmd => "SingleMotorVibrateCmd",
			DeviceCommandKind::VibrateCmd => "VibrateCmd",
		}
	}
}

impl std::fmt::Display for DeviceCommandKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Attributes declared for one accepted command kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributes {
	/// Number of addressable features for per-feature commands.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub feature_count: Option<u32>,
}

impl MessageAttributes {
	pub fn with_feature_count(feature_count: u32) -> Self {
		Self {
			feature_count: Some(feature_count),
		}
	}
}

/// Accepted command kinds of one device, with their attributes.
pub type AllowedMessages = BTreeMap<DeviceCommandKind, MessageAttributes>;

/// Device description carried by `DeviceAdded` events and `DeviceList` replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
	pub device_index: u32,
	pub device_name: String,
	pub allowed_messages: AllowedMessages,
}

/// One `(feature index, intensity)` pair of a `VibrateCmd`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VibrateSubcommand {
	pub index: u32,
	/// Normalized intensity, nominally in `[0.0, 1.0]`.
	pub speed: f64,
}

impl VibrateSubcommand {
	pub fn new(index: u32, speed: f64) -> Self {
		Self { index, speed }
	}
}

/// Device-targeted command, detached from its target index.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
	Stop,
	/// Same intensity on every vibration feature.
	SingleMotorVibrate(f64),
	Vibrate(Vec<VibrateSubcommand>),
}

impl DeviceCommand {
	pub fn kind(&self) -> DeviceCommandKind {
		match self {
			DeviceCommand::Stop => DeviceCommandKind::StopDeviceCmd,
			DeviceCommand::SingleMotorVibrate(_) => DeviceCommandKind::SingleMotorVibrateCmd,
			DeviceCommand::Vibrate(_) => DeviceCommandKind::VibrateCmd,
		}
	}

	/// Rebuilds the wire body addressed to `device_index`.
	pub fn into_body(self, device_index: u32) -> MessageBody {
		match self {
			DeviceCommand::Stop => MessageBody::StopDeviceCmd { device_index },
			DeviceCommand::SingleMotorVibrate(speed) => MessageBody::SingleMotorVibrateCmd {
				device_index,
				speed,
			},
			DeviceCommand::Vibrate(speeds) => MessageBody::VibrateCmd {
				device_index,
				speeds,
			},
		}
	}
}
