//! Request/reply correlation on top of a transport.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_message`] with a message body
//! 2. Connection assigns the next id (never [`SYSTEM_ID`]) and records a pending entry
//! 3. The request is queued for the writer task
//! 4. The run loop receives frames from the transport
//! 5. Frames with id [`SYSTEM_ID`] go to the event channel, in arrival order
//! 6. Other frames resolve the pending entry with the same id; unmatched ids are dropped
//!
//! A pending entry is removed by whichever comes first: its reply, the
//! caller's cancellation, or connection teardown.


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use hapwire_protocol::{Message, MessageBody, MessageId, SYSTEM_ID};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Pending request callbacks keyed by message id.
///
/// `closed` is set under the same lock that drains `entries` on teardown, so
/// no request can register after the drain and wait forever.
#[derive(Default)]
struct PendingRequests {
	entries: HashMap<MessageId, oneshot::Sender<Result<Message>>>,
	closed: bool,
}

type CallbackMap = Arc<Mutex<PendingRequests>>;

/// Traffic the connection hands to its owner instead of a waiting caller.
#[derive(Debug)]
pub enum ConnectionEvent {
	/// Unsolicited server event (id 0), in arrival order.
	Message(Message),
	/// The transport closed or the connection was shut down.
	Closed,
}

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: MessageId,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: MessageId, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		if self.callbacks.lock().entries.remove(&self.id).is_some() {
			tracing::debug!(target = "hapwire.connection", id = self.id, "Removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Message>>,
	guard: CancelGuard,
}

impl ResponseFuture {
	/// Resolves the race between cancellation and a reply.
	///
	/// The pending map is the arbiter: if the entry is still there, the
	/// cancellation removes it and wins. Otherwise the reply path removed it
	/// and already delivered its result under the same lock.
	fn cancel(mut self) -> Result<Message> {
		let removed = self.guard.callbacks.lock().entries.remove(&self.guard.id).is_some();
		self.guard.complete();
		if removed {
			return Err(Error::Cancelled);
		}

		match self.rx.try_recv() {
			Ok(result) => result,
			Err(_) => Err(Error::ChannelClosed),
		}
	}
}

impl Future for ResponseFuture {
	type Output = Result<Message>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Transport halves consumed by [`Connection::run`].
struct RunParts {
	sender: Box<dyn Transport>,
	receiver: Box<dyn TransportReceiver>,
	message_rx: mpsc::UnboundedReceiver<Value>,
	outbound_rx: mpsc::UnboundedReceiver<Value>,
}

/// Client side of one protocol connection.
///
/// Uses strictly increasing request ids and oneshot channels for correlation.
pub struct Connection {
	/// Last id handed out; the first request gets 1.
	last_id: AtomicU32,
	callbacks: CallbackMap,
	/// Channel for sending outbound frames to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Taken once by `run()`
	parts: Mutex<Option<RunParts>>,
	events_tx: mpsc::UnboundedSender<ConnectionEvent>,
	shutdown: CancellationToken,
}

impl Connection {
	/// Creates a connection and the channel its events are delivered on.
	///
	/// The event receiver exists before any traffic flows, so no early event
	/// can be missed.
	pub fn new(parts: TransportParts) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let connection = Self {
			last_id: AtomicU32::new(SYSTEM_ID),
			callbacks: Arc::new(Mutex::new(PendingRequests::default())),
			outbound_tx,
			parts: Mutex::new(Some(RunParts {
				sender,
				receiver,
				message_rx,
				outbound_rx,
			})),
			events_tx,
			shutdown: CancellationToken::new(),
		};
		(connection, events_rx)
	}

	fn next_id(&self) -> MessageId {
		loop {
			let id = self.last_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
			if id != SYSTEM_ID {
				return id;
			}
		}
	}

	/// Number of requests still waiting for a reply.
	pub fn pending_requests(&self) -> usize {
		self.callbacks.lock().entries.len()
	}

	/// Sends a request and awaits its reply.
	///
	/// An `Error` reply resolves to [`Error::Remote`].
	pub async fn send_message(&self, body: MessageBody) -> Result<Message> {
		self.send_message_with_cancel(body, &CancellationToken::new())
			.await
	}

	/// Sends a request, giving up when `cancel` fires first.
	pub async fn send_message_with_cancel(
		&self,
		body: MessageBody,
		cancel: &CancellationToken,
	) -> Result<Message> {
		if self.shutdown.is_cancelled() {
			return Err(Error::NotConnected);
		}

		let id = self.next_id();
		tracing::debug!(target = "hapwire.connection", id, kind = body.name(), "Sending request");

		let (tx, rx) = oneshot::channel();
		{
			let mut callbacks = self.callbacks.lock();
			if callbacks.closed {
				return Err(Error::NotConnected);
			}
			callbacks.entries.insert(id, tx);
		}
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let value = serde_json::to_value(Message::new(id, body))?;
		if self.outbound_tx.send(value).is_err() {
			tracing::error!(target = "hapwire.connection", "Failed to queue message: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		let mut response = ResponseFuture { rx, guard };
		tokio::select! {
			biased;
			result = &mut response => result,
			_ = cancel.cancelled() => response.cancel(),
		}
	}

	/// Stops the run loop. Pending requests fail and [`ConnectionEvent::Closed`] is emitted.
	pub fn close(&self) {
		self.shutdown.cancel();
	}

	pub fn is_closed(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Runs the reader, writer and dispatch loop until the transport closes
	/// or [`close`](Self::close) is called.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let Some(RunParts {
			mut sender,
			receiver,
			mut message_rx,
			mut outbound_rx,
		}) = self.parts.lock().take()
		else {
			return Err(Error::Protocol(
				"run() can only be called once per connection".to_string(),
			));
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!(target = "hapwire.connection", error = %e, "Transport reader stopped");
			}
		});

		let writer_shutdown = self.shutdown.clone();
		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = sender.send(message).await {
					tracing::error!(target = "hapwire.connection", error = %e, "Transport write error");
					writer_shutdown.cancel();
					break;
				}
			}
		});

		loop {
			tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => break,
				message = message_rx.recv() => match message {
					Some(value) => self.dispatch_value(value),
					None => {
						tracing::info!(target = "hapwire.connection", "Transport closed by peer");
						break;
					}
				},
			}
		}

		self.shutdown.cancel();
		reader_handle.abort();
		writer_handle.abort();
		self.fail_pending();
		let _ = self.events_tx.send(ConnectionEvent::Closed);
		Ok(())
	}

	fn dispatch_value(&self, value: Value) {
		match serde_json::from_value::<Message>(value) {
			Ok(message) => self.dispatch(message),
			Err(e) => {
				tracing::warn!(target = "hapwire.connection", error = %e, "Failed to parse message");
			}
		}
	}

	fn dispatch(&self, message: Message) {
		if message.id == SYSTEM_ID {
			tracing::debug!(target = "hapwire.connection", kind = message.body.name(), "Received event");
			let _ = self.events_tx.send(ConnectionEvent::Message(message));
			return;
		}

		let id = message.id;
		let result = match message.body {
			MessageBody::Error { class, message } => Err(Error::Remote { class, message }),
			body => Ok(Message::new(id, body)),
		};

		// Deliver under the lock so a concurrent cancellation observes either
		// the entry or the delivered result, never neither.
		let mut callbacks = self.callbacks.lock();
		match callbacks.entries.remove(&id) {
			Some(callback) => {
				let _ = callback.send(result);
			}
			None => {
				tracing::debug!(target = "hapwire.connection", id, "Dropping reply with no pending request");
			}
		}
	}

	fn fail_pending(&self) {
		let drained: Vec<_> = {
			let mut callbacks = self.callbacks.lock();
			callbacks.closed = true;
			callbacks.entries.drain().collect()
		};
		for (id, callback) in drained {
			tracing::debug!(target = "hapwire.connection", id, "Failing pending request on teardown");
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}
}
