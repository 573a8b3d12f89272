//! Connected devices and command dispatch.
//!
//! A [`DeviceHandle`] owns one piece of hardware and the protocol encoder that
//! drives it. Commands are looked up in a per-kind handler table; the
//! convenience kinds are rewritten into the general vibrate command before
//! reaching the encoder:
//!
//! ```text
//! StopDeviceCmd ──▶ SingleMotorVibrateCmd(0) ──▶ VibrateCmd(all features)
//! ```
//!
//! Commands on one device are serialized by an async mutex around the
//! per-feature state, so validation, encoding and writes for one command
//! never interleave with another's.

pub mod hardware;
pub mod protocol;
pub mod protocols;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hapwire_protocol::{
	AllowedMessages, DeviceCommand, DeviceCommandKind, DeviceInfo, MessageAttributes,
	VibrateSubcommand,
};
use hapwire_runtime::DeviceCommandError;
use tokio::sync::Mutex;

pub use hardware::{Endpoint, HardwareDevice, HardwareError, HardwareWrite};
pub use protocol::{
	DeviceFactory, ProtocolConstructor, ProtocolDescriptor, ProtocolHandler, ProtocolRegistry,
};

/// What happened to a command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
	Applied,
	/// The hardware vanished mid-command. The owner must drop the device.
	DeviceLost,
}

type CommandResult = Result<CommandOutcome, DeviceCommandError>;

type CommandHandler = for<'a> fn(&'a DeviceHandle, DeviceCommand) -> BoxFuture<'a, CommandResult>;

struct CommandEntry {
	attributes: MessageAttributes,
	handler: CommandHandler,
}

struct DeviceState {
	speeds: Vec<f64>,
	protocol: Box<dyn ProtocolHandler>,
}

pub struct DeviceHandle {
	name: String,
	address: String,
	protocol: Arc<str>,
	commands: BTreeMap<DeviceCommandKind, CommandEntry>,
	state: Mutex<DeviceState>,
	hardware: Arc<dyn HardwareDevice>,
}

impl DeviceHandle {
	pub fn new(
		protocol_name: &str,
		protocol: Box<dyn ProtocolHandler>,
		hardware: Arc<dyn HardwareDevice>,
	) -> Self {
		let feature_count = protocol.vibrate_feature_count();

		let mut commands = BTreeMap::new();
		commands.insert(
			DeviceCommandKind::StopDeviceCmd,
			CommandEntry {
				attributes: MessageAttributes::default(),
				handler: handle_stop,
			},
		);
		commands.insert(
			DeviceCommandKind::SingleMotorVibrateCmd,
			CommandEntry {
				attributes: MessageAttributes::default(),
				handler: handle_single_motor_vibrate,
			},
		);
		commands.insert(
			DeviceCommandKind::VibrateCmd,
			CommandEntry {
				attributes: MessageAttributes::with_feature_count(feature_count),
				handler: handle_vibrate,
			},
		);

		Self {
			name: hardware.name().to_string(),
			address: hardware.address().to_string(),
			protocol: Arc::from(protocol_name),
			commands,
			state: Mutex::new(DeviceState {
				speeds: vec![0.0; feature_count as usize],
				protocol,
			}),
			hardware,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn protocol(&self) -> &str {
		&self.protocol
	}

	pub fn allowed_messages(&self) -> AllowedMessages {
		self.commands
			.iter()
			.map(|(kind, entry)| (*kind, entry.attributes))
			.collect()
	}

	pub fn info(&self, device_index: u32) -> DeviceInfo {
		DeviceInfo {
			device_index,
			device_name: self.name.clone(),
			allowed_messages: self.allowed_messages(),
		}
	}

	/// Last applied per-feature values.
	pub async fn speeds(&self) -> Vec<f64> {
		self.state.lock().await.speeds.clone()
	}

	/// Runs a command through the handler registered for its kind.
	///
	/// `device_index` only labels errors.
	pub async fn handle_command(&self, device_index: u32, command: DeviceCommand) -> CommandResult {
		let kind = command.kind();
		let Some(entry) = self.commands.get(&kind) else {
			return Err(DeviceCommandError::UnsupportedCommand {
				index: device_index,
				kind,
			});
		};
		(entry.handler)(self, command).await
	}

	/// Zeroes every feature, then releases the hardware. Write failures are
	/// ignored.
	pub async fn disconnect(&self) {
		{
			let mut state = self.state.lock().await;
			let zeros = vec![0.0; state.speeds.len()];
			if let Ok(writes) = state.protocol.encode_vibrate(&zeros) {
				for write in writes {
					if self.hardware.write(write).await.is_err() {
						break;
					}
				}
			}
			state.speeds = zeros;
		}
		self.hardware.disconnect().await;
	}

	async fn vibrate(&self, subcommands: Vec<VibrateSubcommand>) -> CommandResult {
		let mut state = self.state.lock().await;
		let feature_count = state.speeds.len() as u32;

		if subcommands.is_empty() || subcommands.len() > feature_count as usize {
			return Err(DeviceCommandError::CountOutOfRange {
				count: subcommands.len(),
				feature_count,
			});
		}
		if let Some(bad) = subcommands.iter().find(|s| s.index >= feature_count) {
			return Err(DeviceCommandError::IndexOutOfRange {
				index: bad.index,
				feature_count,
			});
		}

		let mut next = state.speeds.clone();
		for sub in &subcommands {
			let slot = &mut next[sub.index as usize];
			*slot = apply_speed(*slot, sub.speed);
		}

		let writes = state
			.protocol
			.encode_vibrate(&next)
			.map_err(DeviceCommandError::Encode)?;
		state.speeds = next;

		for write in writes {
			match self.hardware.write(write).await {
				Ok(()) => {}
				Err(HardwareError::Disconnected) => {
					tracing::info!(target = "hapwire.device", device = %self.name, address = %self.address, "Device lost during write");
					return Ok(CommandOutcome::DeviceLost);
				}
				Err(HardwareError::Io(message)) => {
					return Err(DeviceCommandError::Hardware(message));
				}
			}
		}
		Ok(CommandOutcome::Applied)
	}
}

/// Stored-value update rule for one feature.
///
/// The clamp looks at the *prior* stored value, not the requested one: a
/// stored value outside `[0, 1]` snaps to the nearest bound, otherwise the
/// requested speed is stored as given. Stored values start at zero and are
/// only ever written here, so in practice the request passes through.
pub(crate) fn apply_speed(prior: f64, requested: f64) -> f64 {
	if prior < 0.0 {
		0.0
	} else if prior > 1.0 {
		1.0
	} else {
		requested
	}
}

fn handle_stop(device: &DeviceHandle, _command: DeviceCommand) -> BoxFuture<'_, CommandResult> {
	tracing::debug!(target = "hapwire.device", device = %device.name, "Stopping device");
	handle_single_motor_vibrate(device, DeviceCommand::SingleMotorVibrate(0.0))
}

fn handle_single_motor_vibrate(
	device: &DeviceHandle,
	command: DeviceCommand,
) -> BoxFuture<'_, CommandResult> {
	Box::pin(async move {
		let DeviceCommand::SingleMotorVibrate(speed) = command else {
			return Err(DeviceCommandError::Encode("wrong handler".to_string()));
		};
		let feature_count = device.state.lock().await.speeds.len() as u32;
		let subcommands = (0..feature_count)
			.map(|index| VibrateSubcommand::new(index, speed))
			.collect();
		device.vibrate(subcommands).await
	})
}

fn handle_vibrate(device: &DeviceHandle, command: DeviceCommand) -> BoxFuture<'_, CommandResult> {
	Box::pin(async move {
		let DeviceCommand::Vibrate(subcommands) = command else {
			return Err(DeviceCommandError::Encode("wrong handler".to_string()));
		};
		device.vibrate(subcommands).await
	})
}
