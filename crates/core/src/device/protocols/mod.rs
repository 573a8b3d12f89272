//! Built-in protocol implementations.

mod kiiroo_v21;
mod kiiroo_v2_vibe;
mod xinput;

pub use kiiroo_v2_vibe::KiirooV2Vibe;
pub use kiiroo_v21::KiirooV21;
pub use xinput::XInput;

use super::protocol::ProtocolConstructor;

/// Converts a unit speed to a device byte scaled 0..=100, truncating.
fn percent(speed: f64) -> u8 {
	(speed * 100.0) as u8
}

pub(crate) const BUILTIN: &[(&str, ProtocolConstructor)] = &[
	("kiiroo-v2-vibrator", KiirooV2Vibe::create),
	("kiiroo-v21", KiirooV21::create),
	("kiiroo-v21-vibrator", KiirooV21::create),
	("xinput", XInput::create),
];
