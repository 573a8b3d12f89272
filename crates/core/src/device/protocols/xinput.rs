use crate::device::hardware::{Endpoint, HardwareWrite};
use crate::device::protocol::ProtocolHandler;

/// Gamepad rumble: left and right motor, each a little-endian u16.
pub struct XInput;

impl XInput {
	pub fn create(_device_name: &str) -> Box<dyn ProtocolHandler> {
		Box::new(Self)
	}
}

fn motor_speed(speed: f64) -> u16 {
	(speed * f64::from(u16::MAX)) as u16
}

impl ProtocolHandler for XInput {
	fn vibrate_feature_count(&self) -> u32 {
		2
	}

	fn encode_vibrate(&mut self, speeds: &[f64]) -> Result<Vec<HardwareWrite>, String> {
		let [left, right] = speeds else {
			return Err(format!("expected 2 motor speeds, got {}", speeds.len()));
		};
		let mut frame = Vec::with_capacity(4);
		frame.extend_from_slice(&motor_speed(*left).to_le_bytes());
		frame.extend_from_slice(&motor_speed(*right).to_le_bytes());
		Ok(vec![HardwareWrite::new(Endpoint::Command, frame)])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scales_to_full_motor_range() {
		let mut pad = XInput;
		let writes = pad.encode_vibrate(&[1.0, 0.0]).unwrap();
		assert_eq!(writes[0].data, vec![0xff, 0xff, 0, 0]);
	}

	#[test]
	fn rejects_wrong_vector_length() {
		let mut pad = XInput;
		assert!(pad.encode_vibrate(&[0.5]).is_err());
	}
}
