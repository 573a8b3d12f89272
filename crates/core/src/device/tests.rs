use std::sync::Arc;

use hapwire_protocol::{DeviceCommand, DeviceCommandKind, MessageAttributes, VibrateSubcommand};
use hapwire_runtime::DeviceCommandError;

use super::*;
use crate::simulated::SimulatedHardware;

fn device(protocol: &str, name: &str) -> (DeviceHandle, Arc<SimulatedHardware>) {
	let hardware = SimulatedHardware::new(name, "sim-0");
	let descriptor = ProtocolRegistry::builtin().get(protocol).unwrap().clone();
	let handle = DeviceHandle::new(
		descriptor.name(),
		descriptor.instantiate(name),
		Arc::clone(&hardware) as Arc<dyn HardwareDevice>,
	);
	(handle, hardware)
}

fn vibrate(pairs: &[(u32, f64)]) -> DeviceCommand {
	DeviceCommand::Vibrate(
		pairs
			.iter()
			.map(|(index, speed)| VibrateSubcommand::new(*index, *speed))
			.collect(),
	)
}

#[test]
fn advertises_vibrate_feature_count() {
	let (fuse, _) = device("kiiroo-v2-vibrator", "Fuse");
	let allowed = fuse.allowed_messages();

	assert_eq!(
		allowed.keys().copied().collect::<Vec<_>>(),
		[
			DeviceCommandKind::StopDeviceCmd,
			DeviceCommandKind::SingleMotorVibrateCmd,
			DeviceCommandKind::VibrateCmd
		]
	);
	assert_eq!(
		allowed[&DeviceCommandKind::VibrateCmd],
		MessageAttributes::with_feature_count(2)
	);
	assert_eq!(fuse.protocol(), "kiiroo-v2-vibrator");
}

#[tokio::test]
async fn vibrate_updates_state_and_writes_frame() {
	let (fuse, hardware) = device("kiiroo-v2-vibrator", "Fuse");

	let outcome = fuse.handle_command(0, vibrate(&[(0, 0.5), (1, 0.75)])).await;

	assert_eq!(outcome, Ok(CommandOutcome::Applied));
	assert_eq!(fuse.speeds().await, vec![0.5, 0.75]);
	assert_eq!(
		hardware.last_write(),
		Some(HardwareWrite::new(Endpoint::Tx, vec![75, 50, 0]))
	);
}

#[tokio::test]
async fn out_of_range_index_applies_nothing() {
	let (fuse, hardware) = device("kiiroo-v2-vibrator", "Fuse");

	let result = fuse.handle_command(3, vibrate(&[(0, 0.5), (2, 0.5)])).await;

	assert_eq!(
		result,
		Err(DeviceCommandError::IndexOutOfRange {
			index: 2,
			feature_count: 2
		})
	);
	assert_eq!(fuse.speeds().await, vec![0.0, 0.0]);
	assert!(hardware.writes().is_empty());
}

#[tokio::test]
async fn subcommand_count_must_fit_feature_count() {
	let (pearl, _) = device("kiiroo-v2-vibrator", "Pearl2");

	assert_eq!(
		pearl.handle_command(0, vibrate(&[])).await,
		Err(DeviceCommandError::CountOutOfRange {
			count: 0,
			feature_count: 1
		})
	);
	assert_eq!(
		pearl.handle_command(0, vibrate(&[(0, 0.1), (0, 0.2)])).await,
		Err(DeviceCommandError::CountOutOfRange {
			count: 2,
			feature_count: 1
		})
	);
}

#[tokio::test]
async fn single_motor_vibrate_targets_every_feature() {
	let (blowbot, hardware) = device("kiiroo-v2-vibrator", "Virtual Blowbot");

	blowbot
		.handle_command(0, DeviceCommand::SingleMotorVibrate(0.5))
		.await
		.unwrap();

	assert_eq!(blowbot.speeds().await, vec![0.5, 0.5, 0.5]);
	assert_eq!(hardware.last_write().unwrap().data, vec![50, 50, 50]);
}

#[tokio::test]
async fn stop_zeroes_every_feature() {
	let (pad, hardware) = device("xinput", "XBox Compatible Gamepad (XInput)");
	pad.handle_command(0, vibrate(&[(0, 1.0), (1, 1.0)]))
		.await
		.unwrap();

	pad.handle_command(0, DeviceCommand::Stop).await.unwrap();

	assert_eq!(pad.speeds().await, vec![0.0, 0.0]);
	assert_eq!(hardware.last_write().unwrap().data, vec![0, 0, 0, 0]);
}

#[tokio::test]
async fn lost_hardware_reports_device_lost() {
	let (cliona, hardware) = device("kiiroo-v21", "Cliona");
	hardware.unplug();

	let outcome = cliona.handle_command(0, DeviceCommand::SingleMotorVibrate(0.3)).await;

	assert_eq!(outcome, Ok(CommandOutcome::DeviceLost));
}

#[tokio::test]
async fn write_failure_is_a_command_error() {
	let (cliona, hardware) = device("kiiroo-v21", "Cliona");
	hardware.fail_next_write(HardwareError::Io("bus busy".into()));

	let result = cliona.handle_command(0, DeviceCommand::SingleMotorVibrate(0.3)).await;

	assert_eq!(result, Err(DeviceCommandError::Hardware("bus busy".into())));
}

#[tokio::test]
async fn disconnect_zeroes_then_releases() {
	let (cliona, hardware) = device("kiiroo-v21", "Cliona");
	cliona
		.handle_command(0, DeviceCommand::SingleMotorVibrate(0.4))
		.await
		.unwrap();

	cliona.disconnect().await;

	assert_eq!(hardware.last_write().unwrap().data, vec![1, 0]);
	assert!(!hardware.is_connected());
}

#[test]
fn stored_value_clamps_against_prior_state() {
	assert_eq!(apply_speed(0.2, 0.9), 0.9);
	assert_eq!(apply_speed(-0.5, 0.9), 0.0);
	assert_eq!(apply_speed(1.5, 0.3), 1.0);
	// An out-of-range request passes through when the prior value is valid.
	assert_eq!(apply_speed(0.0, 1.7), 1.7);
}

#[test]
fn registry_rejects_duplicate_names() {
	let mut registry = ProtocolRegistry::builtin();

	let result = registry.register("xinput", protocols::XInput::create);

	assert_eq!(
		result,
		Err(hapwire_runtime::ConfigurationError::DuplicateProtocol("xinput".into()))
	);
	assert!(registry.names().any(|n| n == "kiiroo-v21-vibrator"));
}

/// Hardware whose writes yield mid-flight and record overlapping writers.
#[derive(Default)]
struct YieldingHardware {
	in_flight: std::sync::atomic::AtomicUsize,
	max_in_flight: std::sync::atomic::AtomicUsize,
	writes: parking_lot::Mutex<Vec<HardwareWrite>>,
}

impl HardwareDevice for YieldingHardware {
	fn name(&self) -> &str {
		"Fuse"
	}

	fn address(&self) -> &str {
		"yield-0"
	}

	fn write(&self, write: HardwareWrite) -> futures_util::future::BoxFuture<'_, std::result::Result<(), HardwareError>> {
		use std::sync::atomic::Ordering;

		Box::pin(async move {
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_in_flight.fetch_max(now, Ordering::SeqCst);
			for _ in 0..5 {
				tokio::task::yield_now().await;
			}
			self.writes.lock().push(write);
			self.in_flight.fetch_sub(1, Ordering::SeqCst);
			Ok(())
		})
	}

	fn disconnect(&self) -> futures_util::future::BoxFuture<'_, ()> {
		Box::pin(async {})
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_to_one_device_are_serialized() {
	let hardware = Arc::new(YieldingHardware::default());
	let descriptor = ProtocolRegistry::builtin()
		.get("kiiroo-v2-vibrator")
		.unwrap()
		.clone();
	let fuse = Arc::new(DeviceHandle::new(
		descriptor.name(),
		descriptor.instantiate("Fuse"),
		Arc::clone(&hardware) as Arc<dyn HardwareDevice>,
	));

	for _ in 0..20 {
		let low = {
			let fuse = Arc::clone(&fuse);
			tokio::spawn(async move { fuse.handle_command(0, vibrate(&[(0, 0.2), (1, 0.2)])).await })
		};
		let high = {
			let fuse = Arc::clone(&fuse);
			tokio::spawn(async move { fuse.handle_command(0, vibrate(&[(0, 0.9), (1, 0.9)])).await })
		};
		assert_eq!(low.await.unwrap(), Ok(CommandOutcome::Applied));
		assert_eq!(high.await.unwrap(), Ok(CommandOutcome::Applied));

		let speeds = fuse.speeds().await;
		assert!(
			speeds == [0.2, 0.2] || speeds == [0.9, 0.9],
			"mixed state {speeds:?}"
		);
		let expected = if speeds[0] == 0.2 { 20 } else { 90 };
		assert_eq!(
			hardware.writes.lock().last().cloned(),
			Some(HardwareWrite::new(Endpoint::Tx, vec![expected, expected, 0]))
		);
	}

	assert_eq!(
		hardware
			.max_in_flight
			.load(std::sync::atomic::Ordering::SeqCst),
		1
	);
}
