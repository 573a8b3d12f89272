//! Length-prefixed JSON framing over a byte stream.

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// Upper bound on a single frame, guarding against corrupt length prefixes.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bidirectional framed transport over a writer and a reader.
pub struct PipeTransport<W, R> {
	writer: W,
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates the transport and the receiver of inbound frames.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				writer,
				reader,
				message_tx,
			},
			message_rx,
		)
	}

	/// Writes one frame.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.writer, &message).await
	}

	/// Reads frames until EOF or until the message receiver is dropped.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.reader, &self.message_tx).await
	}

	/// Splits into independently owned halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender {
				writer: self.writer,
			},
			PipeTransportReceiver {
				reader: self.reader,
				message_tx: self.message_tx,
			},
		)
	}

	/// Boxes both halves together with the inbound channel.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W: AsyncWrite + Unpin + Send> Transport for PipeTransportSender<W> {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { write_frame(&mut self.writer, &message).await })
	}
}

pub struct PipeTransportReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move { read_frames(&mut self.reader, &self.message_tx).await })
	}
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> Result<()> {
	let bytes = serde_json::to_vec(message)?;
	if bytes.len() > MAX_FRAME_LEN {
		return Err(Error::Transport(format!(
			"Frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
			bytes.len()
		)));
	}

	let length = bytes.len() as u32;
	writer
		.write_all(&length.to_le_bytes())
		.await
		.map_err(|e| Error::Transport(format!("Failed to write length prefix: {e}")))?;
	writer
		.write_all(&bytes)
		.await
		.map_err(|e| Error::Transport(format!("Failed to write frame: {e}")))?;
	writer
		.flush()
		.await
		.map_err(|e| Error::Transport(format!("Failed to flush frame: {e}")))?;
	Ok(())
}

async fn read_frames<R: AsyncRead + Unpin>(
	reader: &mut R,
	message_tx: &mpsc::UnboundedSender<Value>,
) -> Result<()> {
	loop {
		let mut len_buf = [0u8; 4];
		reader
			.read_exact(&mut len_buf)
			.await
			.map_err(|e| Error::Transport(format!("Failed to read length prefix: {e}")))?;

		let length = u32::from_le_bytes(len_buf) as usize;
		if length > MAX_FRAME_LEN {
			return Err(Error::Transport(format!(
				"Frame of {length} bytes exceeds limit of {MAX_FRAME_LEN}"
			)));
		}

		let mut buf = vec![0u8; length];
		reader
			.read_exact(&mut buf)
			.await
			.map_err(|e| Error::Transport(format!("Failed to read frame body: {e}")))?;

		let message: Value = match serde_json::from_slice(&buf) {
			Ok(message) => message,
			Err(e) => {
				tracing::warn!(target = "hapwire.transport", error = %e, "Dropping unparseable frame");
				continue;
			}
		};

		if message_tx.send(message).is_err() {
			tracing::debug!(target = "hapwire.transport", "Message receiver dropped, stopping reader");
			return Ok(());
		}
	}
}
