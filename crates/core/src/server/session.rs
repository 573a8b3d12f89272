//! Per-connection server state machine.
//!
//! ```text
//! Unauthenticated ──RequestServerInfo──▶ Ready ──▶ Disconnected
//!        │                                 ▲
//!        └──── version below minimum ──────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use hapwire_protocol::{ErrorClass, LogLevel, MESSAGE_VERSION, Message, MessageBody};
use hapwire_runtime::Error;
use tokio::time::Instant;

use super::device_manager::DeviceManager;
use super::log_forward::LogForwarder;

#[derive(Debug, Clone)]
pub struct ServerOptions {
	pub name: String,
	/// Ping watchdog window; zero disables it.
	pub max_ping_time: Duration,
	/// Lowest client message version accepted.
	pub min_message_version: u32,
}

impl Default for ServerOptions {
	fn default() -> Self {
		Self {
			name: "hapwire server".to_string(),
			max_ping_time: Duration::ZERO,
			min_message_version: MESSAGE_VERSION,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Unauthenticated,
	Ready,
	Disconnected,
}

pub struct ServerSession {
	options: ServerOptions,
	devices: Arc<DeviceManager>,
	logs: Option<LogForwarder>,
	state: SessionState,
	client_name: Option<String>,
	log_level: LogLevel,
	ping_deadline: Option<Instant>,
	/// Set when the session ended on a fatal error rather than a client close.
	fatal: Option<Error>,
}

impl ServerSession {
	pub fn new(options: ServerOptions, devices: Arc<DeviceManager>) -> Self {
		Self {
			options,
			devices,
			logs: None,
			state: SessionState::Unauthenticated,
			client_name: None,
			log_level: LogLevel::Off,
			ping_deadline: None,
			fatal: None,
		}
	}

	pub fn with_log_forwarder(mut self, logs: LogForwarder) -> Self {
		self.logs = Some(logs);
		self
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn client_name(&self) -> Option<&str> {
		self.client_name.as_deref()
	}

	pub fn devices(&self) -> &Arc<DeviceManager> {
		&self.devices
	}

	pub(crate) fn log_forwarder(&self) -> Option<&LogForwarder> {
		self.logs.as_ref()
	}

	pub fn log_level(&self) -> LogLevel {
		self.log_level
	}

	pub fn ping_deadline(&self) -> Option<Instant> {
		self.ping_deadline
	}

	pub(crate) fn take_fatal(&mut self) -> Option<Error> {
		self.fatal.take()
	}

	/// Handles a ping watchdog expiry: stops every device and ends the session.
	///
	/// Returns the event announcing the timeout to the client.
	pub async fn expire_ping(&mut self) -> Message {
		tracing::warn!(target = "hapwire.server", client = ?self.client_name, "Ping timed out, stopping all devices");
		self.devices.stop_all().await;
		self.ping_deadline = None;
		self.state = SessionState::Disconnected;
		self.fatal = Some(Error::PingTimeout);
		Message::error(hapwire_protocol::SYSTEM_ID, ErrorClass::Ping, "Ping timed out.")
	}

	/// Processes one client message and returns its reply.
	pub async fn handle_message(&mut self, message: Message) -> Message {
		let id = message.id;
		tracing::debug!(target = "hapwire.server", id, kind = message.body.name(), "Handling message");

		match self.state {
			SessionState::Disconnected => {
				Message::error(id, ErrorClass::Msg, "Session is disconnected")
			}
			SessionState::Unauthenticated => match message.body {
				MessageBody::RequestServerInfo {
					client_name,
					message_version,
				} => self.handshake(id, client_name, message_version),
				other => Message::error(
					id,
					ErrorClass::Init,
					format!("RequestServerInfo must be sent before {}", other.name()),
				),
			},
			SessionState::Ready => self.handle_ready(id, message.body).await,
		}
	}

	fn handshake(&mut self, id: u32, client_name: String, message_version: u32) -> Message {
		if message_version < self.options.min_message_version {
			let err = Error::ProtocolVersion {
				version: message_version,
				minimum: self.options.min_message_version,
			};
			tracing::warn!(target = "hapwire.server", client = %client_name, error = %err, "Rejecting client");
			self.state = SessionState::Disconnected;
			let reply = Message::error(id, err.class(), err.to_string());
			self.fatal = Some(err);
			return reply;
		}

		tracing::info!(target = "hapwire.server", client = %client_name, message_version, "Client connected");
		self.client_name = Some(client_name);
		self.state = SessionState::Ready;
		self.reset_ping_deadline();

		Message::new(
			id,
			MessageBody::ServerInfo {
				server_name: self.options.name.clone(),
				message_version: MESSAGE_VERSION,
				max_ping_time: u32::try_from(self.options.max_ping_time.as_millis()).unwrap_or(u32::MAX),
			},
		)
	}

	fn reset_ping_deadline(&mut self) {
		if !self.options.max_ping_time.is_zero() {
			self.ping_deadline = Some(Instant::now() + self.options.max_ping_time);
		}
	}

	async fn handle_ready(&mut self, id: u32, body: MessageBody) -> Message {
		let result = match body {
			MessageBody::RequestServerInfo { .. } => {
				return Message::error(id, ErrorClass::Init, "Handshake already completed");
			}
			MessageBody::Ping => {
				self.reset_ping_deadline();
				Ok(())
			}
			MessageBody::StartScanning => self.devices.start_scanning().await,
			MessageBody::StopScanning => self.devices.stop_scanning().await,
			MessageBody::RequestDeviceList => {
				return Message::new(
					id,
					MessageBody::DeviceList {
						devices: self.devices.devices(),
					},
				);
			}
			MessageBody::RequestLog { level } => {
				self.log_level = level;
				Ok(())
			}
			MessageBody::StopAllDevices => {
				self.devices.stop_all().await;
				Ok(())
			}
			body @ (MessageBody::StopDeviceCmd { .. }
			| MessageBody::SingleMotorVibrateCmd { .. }
			| MessageBody::VibrateCmd { .. }) => match body.into_device_command() {
				Ok((index, command)) => self.devices.send_command(index, command).await,
				Err(other) => Err(Error::Protocol(format!("{} is not a device command", other.name()))),
			},
			other @ (MessageBody::Ok
			| MessageBody::Error { .. }
			| MessageBody::ServerInfo { .. }
			| MessageBody::ScanningFinished
			| MessageBody::DeviceList { .. }
			| MessageBody::DeviceAdded(_)
			| MessageBody::DeviceRemoved { .. }
			| MessageBody::Log { .. }) => Err(Error::Protocol(format!(
				"{} cannot be sent by a client",
				other.name()
			))),
		};

		match result {
			Ok(()) => Message::ok(id),
			Err(e) => {
				tracing::debug!(target = "hapwire.server", id, error = %e, "Request failed");
				Message::error(id, e.class(), e.to_string())
			}
		}
	}
}
