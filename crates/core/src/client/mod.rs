//! Client session: connects to a server, mirrors its device registry and
//! keeps the session alive.
//!
//! # Lifecycle
//!
//! 1. [`Client::connect`] opens a transport through its [`ClientConnector`]
//! 2. `RequestServerInfo` negotiates the message version and ping window
//! 3. `RequestDeviceList` seeds the local registry
//! 4. Events queued since the connection opened are applied after the seed,
//!    then in arrival order; none is applied before the snapshot
//! 5. A keepalive pings at half the server's ping window
//!
//! The session ends on [`Client::disconnect`], on transport loss, or when a
//! keepalive ping fails; each raises [`ClientEvent::ServerDisconnect`] once.

mod connector;
mod registry;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hapwire_protocol::{
	DeviceCommand, ErrorClass, LogEntry, LogLevel, MESSAGE_VERSION, Message, MessageBody,
	VibrateSubcommand,
};
use hapwire_runtime::{
	CancellationToken, Connection, ConnectionEvent, DeviceCommandError, Error, Result,
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

pub use connector::{ClientConnector, EmbeddedConnector, TcpConnector};
pub use registry::{ClientDevice, DeviceRegistry};

const EVENT_CAPACITY: usize = 256;

/// Notifications raised to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
	DeviceAdded(ClientDevice),
	DeviceRemoved(ClientDevice),
	ScanningFinished,
	/// A keepalive ping was rejected or the server reported a ping timeout.
	PingTimeout,
	ServerDisconnect,
	Log(LogEntry),
}

struct ActiveSession {
	connection: Arc<Connection>,
	server_name: String,
	max_ping_time: Duration,
}

struct ClientInner {
	name: String,
	connector: Box<dyn ClientConnector>,
	devices: DeviceRegistry,
	events_tx: broadcast::Sender<ClientEvent>,
	/// Serializes connect against teardown.
	lifecycle: Mutex<()>,
	current: RwLock<Option<Arc<ActiveSession>>>,
}

#[derive(Clone)]
pub struct Client {
	inner: Arc<ClientInner>,
}

impl Client {
	pub fn new(name: impl Into<String>, connector: impl ClientConnector + 'static) -> Self {
		let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			inner: Arc::new(ClientInner {
				name: name.into(),
				connector: Box::new(connector),
				devices: DeviceRegistry::new(),
				events_tx,
				lifecycle: Mutex::new(()),
				current: RwLock::new(None),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
		self.inner.events_tx.subscribe()
	}

	pub fn is_connected(&self) -> bool {
		self.inner.current.read().is_some()
	}

	pub fn server_name(&self) -> Option<String> {
		self.inner
			.current
			.read()
			.as_ref()
			.map(|s| s.server_name.clone())
	}

	/// Ping window announced by the server; zero when disabled.
	pub fn max_ping_time(&self) -> Option<Duration> {
		self.inner.current.read().as_ref().map(|s| s.max_ping_time)
	}

	pub fn devices(&self) -> Vec<ClientDevice> {
		self.inner.devices.snapshot()
	}

	pub fn device(&self, index: u32) -> Option<ClientDevice> {
		self.inner.devices.try_get(index)
	}

	pub async fn wait_for_device(&self, index: u32, timeout: Duration) -> Result<ClientDevice> {
		self.inner.devices.wait_for(index, timeout).await
	}

	/// Connects and completes the handshake. A no-op when already connected.
	pub async fn connect(&self) -> Result<()> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		if self.is_connected() {
			tracing::debug!(target = "hapwire.client", "Already connected");
			return Ok(());
		}

		let parts = self.inner.connector.connect().await?;
		let (connection, events_rx) = Connection::new(parts);
		let connection = Arc::new(connection);
		let ping_raised = Arc::new(AtomicBool::new(false));

		let runner = Arc::clone(&connection);
		tokio::spawn(async move {
			if let Err(e) = runner.run().await {
				tracing::debug!(target = "hapwire.client", error = %e, "Connection loop failed");
			}
		});

		let session = match self.inner.handshake(&connection).await {
			Ok(session) => Arc::new(session),
			Err(e) => {
				tracing::warn!(target = "hapwire.client", error = %e, "Handshake failed");
				connection.close();
				self.inner.devices.clear();
				return Err(e);
			}
		};

		tracing::info!(
			target = "hapwire.client",
			server = %session.server_name,
			max_ping_time_ms = session.max_ping_time.as_millis() as u64,
			"Connected"
		);

		// Events wait in `events_rx` until the device list has been applied.
		tokio::spawn(event_loop(
			Arc::downgrade(&self.inner),
			Arc::clone(&connection),
			events_rx,
			Arc::clone(&ping_raised),
		));
		if !session.max_ping_time.is_zero() {
			tokio::spawn(keepalive(
				Arc::downgrade(&self.inner),
				Arc::clone(&connection),
				session.max_ping_time / 2,
				ping_raised,
			));
		}
		*self.inner.current.write() = Some(session);
		Ok(())
	}

	/// Closes the session. A no-op when not connected.
	pub async fn disconnect(&self) {
		let connection = self
			.inner
			.current
			.read()
			.as_ref()
			.map(|s| Arc::clone(&s.connection));
		if let Some(connection) = connection {
			self.inner.teardown(&connection).await;
		}
	}

	pub async fn start_scanning(&self) -> Result<()> {
		self.start_scanning_with_cancel(&CancellationToken::new())
			.await
	}

	pub async fn start_scanning_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
		self.request_ok(MessageBody::StartScanning, cancel).await
	}

	pub async fn stop_scanning(&self) -> Result<()> {
		self.stop_scanning_with_cancel(&CancellationToken::new())
			.await
	}

	pub async fn stop_scanning_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
		self.request_ok(MessageBody::StopScanning, cancel).await
	}

	/// Asks the server to forward its log entries at `level` and above.
	/// [`LogLevel::Off`] stops forwarding.
	pub async fn request_log(&self, level: LogLevel) -> Result<()> {
		self.request_ok(MessageBody::RequestLog { level }, &CancellationToken::new())
			.await
	}

	pub async fn stop_all_devices(&self) -> Result<()> {
		self.stop_all_devices_with_cancel(&CancellationToken::new())
			.await
	}

	pub async fn stop_all_devices_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
		self.request_ok(MessageBody::StopAllDevices, cancel).await
	}

	pub async fn ping(&self) -> Result<()> {
		self.ping_with_cancel(&CancellationToken::new()).await
	}

	pub async fn ping_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
		self.request_ok(MessageBody::Ping, cancel).await
	}

	pub async fn send_device_command(&self, device: &ClientDevice, command: DeviceCommand) -> Result<()> {
		self.send_device_command_with_cancel(device, command, &CancellationToken::new())
			.await
	}

	/// Validates `command` against the local registry, then sends it.
	///
	/// Fails without sending if `device` was removed (or replaced) or does
	/// not accept the command kind.
	pub async fn send_device_command_with_cancel(
		&self,
		device: &ClientDevice,
		command: DeviceCommand,
		cancel: &CancellationToken,
	) -> Result<()> {
		if !self.is_connected() {
			return Err(Error::NotConnected);
		}
		if !self.inner.devices.is_current(device) {
			return Err(DeviceCommandError::DeviceNotAvailable(device.index).into());
		}
		let kind = command.kind();
		if !device.allows(kind) {
			return Err(DeviceCommandError::UnsupportedCommand {
				index: device.index,
				kind,
			}
			.into());
		}
		self.request_ok(command.into_body(device.index), cancel)
			.await
	}

	pub async fn vibrate(&self, device: &ClientDevice, speeds: Vec<VibrateSubcommand>) -> Result<()> {
		self.send_device_command(device, DeviceCommand::Vibrate(speeds))
			.await
	}

	pub async fn single_motor_vibrate(&self, device: &ClientDevice, speed: f64) -> Result<()> {
		self.send_device_command(device, DeviceCommand::SingleMotorVibrate(speed))
			.await
	}

	pub async fn stop_device(&self, device: &ClientDevice) -> Result<()> {
		self.send_device_command(device, DeviceCommand::Stop)
			.await
	}

	async fn request_ok(&self, body: MessageBody, cancel: &CancellationToken) -> Result<()> {
		let connection = self
			.inner
			.current
			.read()
			.as_ref()
			.map(|s| Arc::clone(&s.connection))
			.ok_or(Error::NotConnected)?;

		let reply = connection.send_message_with_cancel(body, cancel).await?;
		match reply.body {
			MessageBody::Ok => Ok(()),
			other => Err(Error::Protocol(format!("expected Ok, got {}", other.name()))),
		}
	}
}

impl ClientInner {
	async fn handshake(&self, connection: &Arc<Connection>) -> Result<ActiveSession> {
		let reply = connection
			.send_message(MessageBody::RequestServerInfo {
				client_name: self.name.clone(),
				message_version: MESSAGE_VERSION,
			})
			.await?;
		let (server_name, message_version, max_ping_time) = match reply.body {
			MessageBody::ServerInfo {
				server_name,
				message_version,
				max_ping_time,
			} => (server_name, message_version, max_ping_time),
			other => {
				return Err(Error::Protocol(format!(
					"expected ServerInfo, got {}",
					other.name()
				)));
			}
		};
		if message_version < MESSAGE_VERSION {
			return Err(Error::ProtocolVersion {
				version: message_version,
				minimum: MESSAGE_VERSION,
			});
		}

		let reply = connection.send_message(MessageBody::RequestDeviceList).await?;
		let devices = match reply.body {
			MessageBody::DeviceList { devices } => devices,
			other => {
				return Err(Error::Protocol(format!(
					"expected DeviceList, got {}",
					other.name()
				)));
			}
		};
		for info in devices {
			if let Some(device) = self.devices.insert(info) {
				self.emit(ClientEvent::DeviceAdded(device));
			}
		}

		Ok(ActiveSession {
			connection: Arc::clone(connection),
			server_name,
			max_ping_time: Duration::from_millis(u64::from(max_ping_time)),
		})
	}

	fn emit(&self, event: ClientEvent) {
		let _ = self.events_tx.send(event);
	}

	fn raise_ping_timeout(&self, raised: &AtomicBool) {
		if !raised.swap(true, Ordering::SeqCst) {
			self.emit(ClientEvent::PingTimeout);
		}
	}

	fn handle_event(&self, message: Message, ping_raised: &AtomicBool) {
		match message.body {
			MessageBody::DeviceAdded(info) => {
				if let Some(device) = self.devices.insert(info) {
					tracing::debug!(target = "hapwire.client", index = device.index, name = %device.name, "Device added");
					self.emit(ClientEvent::DeviceAdded(device));
				}
			}
			MessageBody::DeviceRemoved { device_index } => {
				if let Some(device) = self.devices.remove(device_index) {
					tracing::debug!(target = "hapwire.client", index = device_index, "Device removed");
					self.emit(ClientEvent::DeviceRemoved(device));
				}
			}
			MessageBody::ScanningFinished => self.emit(ClientEvent::ScanningFinished),
			MessageBody::Log { level, message } => self.emit(ClientEvent::Log(LogEntry { level, message })),
			MessageBody::Error {
				class: ErrorClass::Ping,
				message,
			} => {
				tracing::warn!(target = "hapwire.client", message = %message, "Server reported ping timeout");
				self.raise_ping_timeout(ping_raised);
			}
			MessageBody::Error { class, message } => {
				tracing::warn!(target = "hapwire.client", ?class, message = %message, "Server reported error");
			}
			other => {
				tracing::debug!(target = "hapwire.client", kind = other.name(), "Ignoring unexpected event");
			}
		}
	}

	/// Ends the session bound to `connection`, if it is still the current one.
	async fn teardown(&self, connection: &Arc<Connection>) {
		let _lifecycle = self.lifecycle.lock().await;
		let is_current = self
			.current
			.read()
			.as_ref()
			.is_some_and(|s| Arc::ptr_eq(&s.connection, connection));
		if !is_current {
			connection.close();
			return;
		}

		*self.current.write() = None;
		connection.close();
		self.devices.clear();
		tracing::info!(target = "hapwire.client", "Disconnected");
		self.emit(ClientEvent::ServerDisconnect);
	}
}

impl Drop for ClientInner {
	fn drop(&mut self) {
		if let Some(session) = self.current.get_mut().take() {
			session.connection.close();
		}
	}
}

async fn event_loop(
	inner: Weak<ClientInner>,
	connection: Arc<Connection>,
	mut events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
	ping_raised: Arc<AtomicBool>,
) {
	while let Some(event) = events_rx.recv().await {
		let Some(inner) = inner.upgrade() else {
			break;
		};
		match event {
			ConnectionEvent::Message(message) => inner.handle_event(message, &ping_raised),
			ConnectionEvent::Closed => {
				inner.teardown(&connection).await;
				break;
			}
		}
	}
}

async fn keepalive(
	inner: Weak<ClientInner>,
	connection: Arc<Connection>,
	period: Duration,
	ping_raised: Arc<AtomicBool>,
) {
	let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		ticker.tick().await;
		if connection.is_closed() {
			break;
		}

		let Err(e) = connection.send_message(MessageBody::Ping).await else {
			continue;
		};
		if connection.is_closed() {
			break;
		}
		let Some(inner) = inner.upgrade() else {
			break;
		};
		if e.remote_class().is_some() {
			tracing::warn!(target = "hapwire.client", error = %e, "Ping rejected by server");
			inner.raise_ping_timeout(&ping_raised);
		} else {
			tracing::warn!(target = "hapwire.client", error = %e, "Keepalive failed");
		}
		inner.teardown(&connection).await;
		break;
	}
	tracing::debug!(target = "hapwire.client", "Keepalive stopped");
}
