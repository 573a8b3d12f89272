//! Bridges `tracing` events to connected clients that asked for logs.

use std::fmt::Write as _;

use hapwire_protocol::{LogEntry, LogLevel};
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const LOG_CAPACITY: usize = 1024;

/// Fan-out point for forwarded log entries. Clones share one channel.
#[derive(Clone)]
pub struct LogForwarder {
	tx: broadcast::Sender<LogEntry>,
}

impl Default for LogForwarder {
	fn default() -> Self {
		Self::new()
	}
}

impl LogForwarder {
	pub fn new() -> Self {
		let (tx, _) = broadcast::channel(LOG_CAPACITY);
		Self { tx }
	}

	/// Layer to install in the process subscriber.
	pub fn layer(&self) -> LogForwardLayer {
		LogForwardLayer {
			tx: self.tx.clone(),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
		self.tx.subscribe()
	}
}

pub struct LogForwardLayer {
	tx: broadcast::Sender<LogEntry>,
}

fn protocol_level(level: &Level) -> LogLevel {
	match *level {
		Level::ERROR => LogLevel::Error,
		Level::WARN => LogLevel::Warn,
		Level::INFO => LogLevel::Info,
		Level::DEBUG => LogLevel::Debug,
		Level::TRACE => LogLevel::Trace,
	}
}

#[derive(Default)]
struct MessageVisitor {
	message: String,
	fields: String,
}

impl Visit for MessageVisitor {
	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message.push_str(value);
		} else {
			let _ = write!(self.fields, " {}={}", field.name(), value);
		}
	}

	fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
		if field.name() == "message" {
			let _ = write!(self.message, "{value:?}");
		} else {
			let _ = write!(self.fields, " {}={:?}", field.name(), value);
		}
	}
}

impl<S: Subscriber> Layer<S> for LogForwardLayer {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		if self.tx.receiver_count() == 0 {
			return;
		}
		let metadata = event.metadata();
		let mut visitor = MessageVisitor::default();
		event.record(&mut visitor);
		let _ = self.tx.send(LogEntry {
			level: protocol_level(metadata.level()),
			message: format!("{}{}", visitor.message, visitor.fields),
		});
	}
}

#[cfg(test)]
mod tests {
	use tracing_subscriber::layer::SubscriberExt;

	use super::*;

	#[test]
	fn forwards_events_with_fields() {
		let forwarder = LogForwarder::new();
		let mut rx = forwarder.subscribe();
		let subscriber = tracing_subscriber::registry().with(forwarder.layer());

		tracing::subscriber::with_default(subscriber, || {
			tracing::warn!(index = 3, "Device stalled");
		});

		let entry = rx.try_recv().unwrap();
		assert_eq!(entry.level, LogLevel::Warn);
		assert_eq!(entry.message, "Device stalled index=3");
	}

	#[test]
	fn silent_without_subscribers() {
		let forwarder = LogForwarder::new();
		let subscriber = tracing_subscriber::registry().with(forwarder.layer());

		tracing::subscriber::with_default(subscriber, || {
			tracing::info!("nobody listening");
		});

		assert!(forwarder.subscribe().try_recv().is_err());
	}
}
