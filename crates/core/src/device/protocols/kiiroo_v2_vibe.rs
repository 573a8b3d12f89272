use super::percent;
use crate::device::hardware::{Endpoint, HardwareWrite};
use crate::device::protocol::ProtocolHandler;

struct Model {
	name: &'static str,
	vibe_count: u32,
	/// Feature index carried by each output byte.
	vibe_order: [u32; 3],
}

const MODELS: &[Model] = &[
	Model {
		name: "Pearl2",
		vibe_count: 1,
		vibe_order: [0, 1, 2],
	},
	Model {
		name: "Fuse",
		vibe_count: 2,
		vibe_order: [1, 0, 2],
	},
	Model {
		name: "Virtual Blowbot",
		vibe_count: 3,
		vibe_order: [0, 1, 2],
	},
	Model {
		name: "Titan",
		vibe_count: 1,
		vibe_order: [2, 0, 1],
	},
];

/// Kiiroo second-generation vibrators: one three-byte frame per update.
pub struct KiirooV2Vibe {
	model: &'static Model,
}

impl KiirooV2Vibe {
	pub fn create(device_name: &str) -> Box<dyn ProtocolHandler> {
		let model = MODELS
			.iter()
			.find(|m| m.name == device_name)
			.unwrap_or_else(|| {
				tracing::warn!(target = "hapwire.device", device = device_name, "Unknown Kiiroo model, assuming a single vibrator");
				&MODELS[0]
			});
		Box::new(Self { model })
	}
}

impl ProtocolHandler for KiirooV2Vibe {
	fn vibrate_feature_count(&self) -> u32 {
		self.model.vibe_count
	}

	fn encode_vibrate(&mut self, speeds: &[f64]) -> Result<Vec<HardwareWrite>, String> {
		let mut frame = [0u8; 3];
		for (slot, feature) in frame.iter_mut().zip(self.model.vibe_order) {
			if let Some(speed) = speeds.get(feature as usize) {
				*slot = percent(*speed);
			}
		}
		Ok(vec![HardwareWrite::new(Endpoint::Tx, frame.to_vec())])
	}
}
