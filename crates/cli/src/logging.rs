use hapwire::server::LogForwarder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter applied when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = errors only
	// 1 (-v) = info
	// 2+ (-vv) = debug for everything
	match verbosity {
		0 => "error",
		1 => "info",
		_ => "debug",
	}
}

/// Installs stderr output plus the layer feeding `RequestLog` subscribers.
///
/// The forward layer sees every event the filter lets through; each session
/// then applies the level its client asked for.
pub fn init_logging(verbosity: u8, forwarder: &LogForwarder) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::registry()
		.with(env_filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(stderr)
				.with_target(true)
				.with_level(true)
				.compact(),
		)
		.with(forwarder.layer())
		.init();
}

#[cfg(test)]
mod tests {
	use super::default_filter;

	#[test]
	fn verbosity_raises_the_default_level() {
		assert_eq!(default_filter(0), "error");
		assert_eq!(default_filter(1), "info");
		assert_eq!(default_filter(2), "debug");
		assert_eq!(default_filter(7), "debug");
	}
}
