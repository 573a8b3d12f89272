//! Drives one [`ServerSession`] over a transport.

use std::time::Duration;

use hapwire_protocol::{ErrorClass, LogEntry, Message, MessageBody, SYSTEM_ID};
use hapwire_runtime::{Error, TransportParts};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep_until;

use super::device_manager::DeviceEvent;
use super::session::{ServerSession, SessionState};

/// Time allowed for queued frames to drain once a session ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
	ClientClosed,
	PingTimeout,
	ProtocolVersion,
	Transport,
	/// Device events were dropped for a slow client; its mirror can no
	/// longer be trusted, so the session ends and the client must reconnect.
	EventsLagged,
}

fn device_event_message(event: DeviceEvent) -> Message {
	Message::event(match event {
		DeviceEvent::Added(info) => MessageBody::DeviceAdded(info),
		DeviceEvent::Removed(device_index) => MessageBody::DeviceRemoved { device_index },
		DeviceEvent::ScanningFinished => MessageBody::ScanningFinished,
	})
}

async fn next_log(logs: &mut Option<broadcast::Receiver<LogEntry>>) -> Option<LogEntry> {
	let Some(rx) = logs else {
		return std::future::pending().await;
	};
	loop {
		match rx.recv().await {
			Ok(entry) => return Some(entry),
			Err(broadcast::error::RecvError::Lagged(_)) => continue,
			Err(broadcast::error::RecvError::Closed) => return None,
		}
	}
}

/// Serves `session` until the client leaves or the session hits a fatal error.
pub async fn serve(mut session: ServerSession, parts: TransportParts) -> DisconnectReason {
	let TransportParts {
		mut sender,
		receiver,
		mut message_rx,
	} = parts;

	let mut device_events = session.devices().subscribe();
	let mut logs = session.log_forwarder().map(|f| f.subscribe());

	let reader_handle = tokio::spawn(async move {
		if let Err(e) = receiver.run().await {
			tracing::debug!(target = "hapwire.server", error = %e, "Transport reader stopped");
		}
	});

	let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
	let (write_failed_tx, mut write_failed_rx) = mpsc::channel::<()>(1);
	let writer_handle = tokio::spawn(async move {
		while let Some(value) = outbound_rx.recv().await {
			if let Err(e) = sender.send(value).await {
				tracing::warn!(target = "hapwire.server", error = %e, "Transport write error");
				let _ = write_failed_tx.try_send(());
				break;
			}
		}
	});

	let send = |message: Message| match serde_json::to_value(&message) {
		Ok(value) => {
			let _ = outbound_tx.send(value);
		}
		Err(e) => tracing::error!(target = "hapwire.server", error = %e, "Failed to serialize message"),
	};

	let reason = loop {
		let deadline = session.ping_deadline();
		tokio::select! {
			inbound = message_rx.recv() => {
				let Some(value) = inbound else {
					break DisconnectReason::ClientClosed;
				};
				let reply = match serde_json::from_value::<Message>(value) {
					Ok(message) => session.handle_message(message).await,
					Err(e) => Message::error(SYSTEM_ID, ErrorClass::Msg, format!("Malformed message: {e}")),
				};
				send(reply);
				if session.state() == SessionState::Disconnected {
					break match session.take_fatal() {
						Some(Error::PingTimeout) => DisconnectReason::PingTimeout,
						_ => DisconnectReason::ProtocolVersion,
					};
				}
			}
			event = device_events.recv() => match event {
				Ok(event) => {
					if session.state() == SessionState::Ready {
						send(device_event_message(event));
					}
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::warn!(target = "hapwire.server", skipped, "Device events lagged");
					// Before the handshake the client has no mirror yet; the
					// device list it requests next is authoritative.
					if session.state() == SessionState::Ready {
						send(Message::error(
							SYSTEM_ID,
							ErrorClass::Unknown,
							format!("{skipped} device events were dropped; reconnect to resync"),
						));
						break DisconnectReason::EventsLagged;
					}
				}
				Err(broadcast::error::RecvError::Closed) => {}
			},
			Some(entry) = next_log(&mut logs) => {
				if session.state() == SessionState::Ready && session.log_level().admits(entry.level) {
					send(Message::event(MessageBody::Log {
						level: entry.level,
						message: entry.message,
					}));
				}
			}
			_ = async {
				match deadline {
					Some(deadline) => sleep_until(deadline).await,
					None => std::future::pending().await,
				}
			} => {
				send(session.expire_ping().await);
				break DisconnectReason::PingTimeout;
			}
			_ = write_failed_rx.recv() => break DisconnectReason::Transport,
		}
	};

	drop(outbound_tx);
	let _ = tokio::time::timeout(FLUSH_TIMEOUT, writer_handle).await;
	reader_handle.abort();

	tracing::info!(target = "hapwire.server", client = ?session.client_name(), ?reason, "Session ended");
	reason
}
