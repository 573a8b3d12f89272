//! End-to-end tests: a client talking to an in-process server.

use std::sync::Arc;
use std::time::Duration;

use hapwire::client::{Client, ClientEvent, EmbeddedConnector, TcpConnector};
use hapwire::config::DeviceConfigurationManager;
use hapwire::device::ProtocolRegistry;
use hapwire::protocol::{DeviceCommandKind, VibrateSubcommand};
use hapwire::server::{DeviceDiscovery, DeviceManager, ServerOptions, ServerSession, serve};
use hapwire::simulated::SimulatedDiscovery;
use hapwire_runtime::PipeTransport;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

const CATALOG: &str = r#"{"protocols":{
	"kiiroo-v2-vibrator":{"btle":{"names":["Fuse","Pearl2","Titan"]}},
	"kiiroo-v21":{"btle":{"names":["Cliona"]}},
	"xinput":null
}}"#;

fn server() -> (Arc<DeviceManager>, Arc<SimulatedDiscovery>) {
	let config = DeviceConfigurationManager::new(ProtocolRegistry::builtin());
	config.load_base_json(CATALOG).unwrap();
	let devices = DeviceManager::new(Arc::new(config));
	devices.start();
	let discovery = SimulatedDiscovery::new();
	devices.add_discovery(Arc::clone(&discovery) as Arc<dyn DeviceDiscovery>);
	(devices, discovery)
}

async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for client event")
		.unwrap()
}

#[tokio::test]
async fn vibrate_reaches_hardware() {
	let (devices, discovery) = server();
	let hardware = discovery.add_ble("Fuse", "aa:00");
	let client = Client::new("e2e", EmbeddedConnector::new(Arc::clone(&devices), ServerOptions::default()));
	let mut events = client.events();

	client.connect().await.unwrap();
	client.start_scanning().await.unwrap();
	let ClientEvent::DeviceAdded(fuse) = next_event(&mut events).await else {
		panic!("expected device added");
	};
	assert_eq!(fuse.feature_count(DeviceCommandKind::VibrateCmd), Some(2));

	client
		.vibrate(
			&fuse,
			vec![VibrateSubcommand::new(0, 0.5), VibrateSubcommand::new(1, 0.75)],
		)
		.await
		.unwrap();

	let (_, handle) = devices.device(fuse.index).unwrap();
	assert_eq!(handle.speeds().await, vec![0.5, 0.75]);
	assert_eq!(hardware.last_write().unwrap().data, vec![75, 50, 0]);

	client.stop_scanning().await.unwrap();
	assert_eq!(next_event(&mut events).await, ClientEvent::ScanningFinished);
}

#[tokio::test]
async fn out_of_range_vibrate_is_a_device_error() {
	let (devices, discovery) = server();
	discovery.add_ble("Pearl2", "aa:01");
	let client = Client::new("e2e", EmbeddedConnector::new(devices, ServerOptions::default()));
	let mut events = client.events();
	client.connect().await.unwrap();
	client.start_scanning().await.unwrap();
	let ClientEvent::DeviceAdded(pearl) = next_event(&mut events).await else {
		panic!("expected device added");
	};

	let err = client
		.vibrate(&pearl, vec![VibrateSubcommand::new(1, 0.5)])
		.await
		.unwrap_err();

	assert_eq!(err.remote_class(), Some(hapwire::protocol::ErrorClass::Device));
	assert!(client.is_connected());
}

#[tokio::test]
async fn removal_round_trip() {
	let (devices, discovery) = server();
	let client = Client::new("e2e", EmbeddedConnector::new(devices, ServerOptions::default()));
	let mut events = client.events();
	client.connect().await.unwrap();
	client.start_scanning().await.unwrap();

	discovery.add_ble("Cliona", "bb:00");
	let ClientEvent::DeviceAdded(cliona) = next_event(&mut events).await else {
		panic!("expected device added");
	};
	assert_eq!(client.devices(), vec![cliona.clone()]);

	discovery.remove("bb:00");
	assert_eq!(next_event(&mut events).await, ClientEvent::DeviceRemoved(cliona.clone()));
	assert!(client.devices().is_empty());

	discovery.add_ble("Cliona", "bb:00");
	let ClientEvent::DeviceAdded(again) = next_event(&mut events).await else {
		panic!("expected device added");
	};
	assert_eq!(again.index, cliona.index);
	assert_ne!(again.generation(), cliona.generation());
}

#[tokio::test]
async fn late_client_sees_existing_devices() {
	let (devices, discovery) = server();
	discovery.add_ble("Titan", "cc:00");
	let mut manager_events = devices.subscribe();
	devices.start_scanning().await.unwrap();
	manager_events.recv().await.unwrap();

	let client = Client::new("late", EmbeddedConnector::new(devices, ServerOptions::default()));
	client.connect().await.unwrap();

	let titan = client.wait_for_device(0, Duration::from_secs(1)).await.unwrap();
	assert_eq!(titan.name, "Titan");
	client.stop_all_devices().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn keepalive_holds_the_session_open() {
	let (devices, _) = server();
	let options = ServerOptions {
		max_ping_time: Duration::from_millis(1000),
		..ServerOptions::default()
	};
	let client = Client::new("e2e", EmbeddedConnector::new(devices, options));
	let mut events = client.events();
	client.connect().await.unwrap();
	assert_eq!(client.max_ping_time(), Some(Duration::from_millis(1000)));

	tokio::time::sleep(Duration::from_millis(2600)).await;

	assert!(client.is_connected());
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_is_reported_once() {
	let (devices, _) = server();
	let client = Client::new("e2e", EmbeddedConnector::new(devices, ServerOptions::default()));
	let mut events = client.events();
	client.connect().await.unwrap();

	client.disconnect().await;
	client.disconnect().await;

	assert_eq!(next_event(&mut events).await, ClientEvent::ServerDisconnect);
	assert!(events.try_recv().is_err());
	assert!(!client.is_connected());
}

#[tokio::test]
async fn tcp_transport_round_trip() {
	let (devices, discovery) = server();
	discovery.add_ble("Fuse", "aa:02");
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let address = listener.local_addr().unwrap();

	let server_devices = Arc::clone(&devices);
	tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let (read, write) = stream.into_split();
		let (transport, message_rx) = PipeTransport::new(write, read);
		let session = ServerSession::new(ServerOptions::default(), server_devices);
		serve(session, transport.into_transport_parts(message_rx)).await
	});

	let client = Client::new("tcp", TcpConnector::new(address.to_string()));
	let mut events = client.events();
	client.connect().await.unwrap();
	client.start_scanning().await.unwrap();

	let ClientEvent::DeviceAdded(fuse) = next_event(&mut events).await else {
		panic!("expected device added");
	};
	client.single_motor_vibrate(&fuse, 0.25).await.unwrap();
	let (_, handle) = devices.device(fuse.index).unwrap();
	assert_eq!(handle.speeds().await, vec![0.25, 0.25]);
}
