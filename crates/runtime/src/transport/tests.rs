use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

#[test]
fn test_length_prefix_encoding() {
	let length: u32 = 1234;
	let bytes = length.to_le_bytes();

	assert_eq!(bytes[0], (length & 0xFF) as u8);
	assert_eq!(bytes[1], ((length >> 8) & 0xFF) as u8);
	assert_eq!(bytes[2], ((length >> 16) & 0xFF) as u8);
	assert_eq!(bytes[3], ((length >> 24) & 0xFF) as u8);
	assert_eq!(u32::from_le_bytes(bytes), length);
}

#[tokio::test]
async fn test_send_message() {
	let (peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, _peer_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(transport_write, transport_read);
	let (mut sender, _receiver) = transport.into_parts();

	let message = serde_json::json!({"id": 1, "type": "ping"});
	Transport::send(&mut sender, message.clone()).await.unwrap();

	let (mut read_half, _write_half) = tokio::io::split(peer_read);
	let mut len_buf = [0u8; 4];
	read_half.read_exact(&mut len_buf).await.unwrap();
	let length = u32::from_le_bytes(len_buf) as usize;

	let mut msg_buf = vec![0u8; length];
	read_half.read_exact(&mut msg_buf).await.unwrap();

	let received: serde_json::Value = serde_json::from_slice(&msg_buf).unwrap();
	assert_eq!(received, message);
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
	let (_peer_read, transport_write) = tokio::io::duplex(4096);
	let (transport_read, mut peer_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = PipeTransport::new(transport_write, transport_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages = vec![
		serde_json::json!({"id": 1, "type": "ok"}),
		serde_json::json!({"id": 0, "type": "scanning_finished"}),
		serde_json::json!({"id": 2, "type": "ok"}),
	];

	for msg in &messages {
		let json_bytes = serde_json::to_vec(msg).unwrap();
		let length = json_bytes.len() as u32;
		peer_write.write_all(&length.to_le_bytes()).await.unwrap();
		peer_write.write_all(&json_bytes).await.unwrap();
	}
	peer_write.flush().await.unwrap();

	for expected in &messages {
		let received = rx.recv().await.unwrap();
		assert_eq!(&received, expected);
	}

	drop(peer_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_unparseable_frame_is_skipped() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(transport_write, transport_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let garbage = b"{not json";
	peer_write
		.write_all(&(garbage.len() as u32).to_le_bytes())
		.await
		.unwrap();
	peer_write.write_all(garbage).await.unwrap();

	let good = serde_json::to_vec(&serde_json::json!({"id": 4, "type": "ok"})).unwrap();
	peer_write
		.write_all(&(good.len() as u32).to_le_bytes())
		.await
		.unwrap();
	peer_write.write_all(&good).await.unwrap();
	peer_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received["id"], 4);

	drop(peer_write);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_oversized_length_prefix() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(transport_write, transport_read);

	let length = (MAX_FRAME_LEN as u32) + 1;
	peer_write.write_all(&length.to_le_bytes()).await.unwrap();
	peer_write.flush().await.unwrap();

	let result = transport.run().await;
	assert!(result.unwrap_err().to_string().contains("exceeds limit"));
}

#[tokio::test]
async fn test_malformed_length_prefix() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(transport_write, transport_read);

	peer_write.write_all(&[0x01, 0x02]).await.unwrap();
	peer_write.flush().await.unwrap();
	drop(peer_write);

	let result = transport.run().await;
	assert!(result.is_err());
	assert!(
		result
			.unwrap_err()
			.to_string()
			.contains("Failed to read length prefix")
	);
}

#[tokio::test]
async fn test_channel_pair_delivers_both_ways() {
	let (mut a, mut b) = channel_pair();

	a.sender
		.send(serde_json::json!({"id": 1, "type": "ping"}))
		.await
		.unwrap();
	b.sender
		.send(serde_json::json!({"id": 1, "type": "ok"}))
		.await
		.unwrap();

	assert_eq!(b.message_rx.recv().await.unwrap()["type"], "ping");
	assert_eq!(a.message_rx.recv().await.unwrap()["type"], "ok");
}

#[tokio::test]
async fn test_channel_pair_close_is_observed() {
	let (a, mut b) = channel_pair();
	drop(a.sender);
	assert!(b.message_rx.recv().await.is_none());
}
