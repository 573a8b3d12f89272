use super::percent;
use crate::device::hardware::{Endpoint, HardwareWrite};
use crate::device::protocol::ProtocolHandler;

const MODELS: &[(&str, u32)] = &[("Cliona", 1), ("Pearl2.1", 1)];

const VIBRATE_COMMAND: u8 = 0x01;

/// Kiiroo 2.1 devices: a command byte followed by one speed byte per vibrator.
pub struct KiirooV21 {
	vibe_count: u32,
}

impl KiirooV21 {
	pub fn create(device_name: &str) -> Box<dyn ProtocolHandler> {
		let vibe_count = MODELS
			.iter()
			.find(|(name, _)| *name == device_name)
			.map(|(_, count)| *count)
			.unwrap_or(1);
		Box::new(Self { vibe_count })
	}
}

impl ProtocolHandler for KiirooV21 {
	fn vibrate_feature_count(&self) -> u32 {
		self.vibe_count
	}

	fn encode_vibrate(&mut self, speeds: &[f64]) -> Result<Vec<HardwareWrite>, String> {
		let mut frame = Vec::with_capacity(speeds.len() + 1);
		frame.push(VIBRATE_COMMAND);
		frame.extend(speeds.iter().map(|s| percent(*s)));
		Ok(vec![HardwareWrite::new(Endpoint::Tx, frame)])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefixes_the_vibrate_command() {
		let mut cliona = KiirooV21::create("Cliona");
		let writes = cliona.encode_vibrate(&[0.5]).unwrap();
		assert_eq!(writes, vec![HardwareWrite::new(Endpoint::Tx, vec![1, 50])]);
	}
}
