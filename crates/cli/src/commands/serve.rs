use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hapwire::server::{DeviceManager, LogForwarder, ServerOptions, ServerSession, serve};
use hapwire::simulated::SimulatedDiscovery;
use hapwire_runtime::PipeTransport;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::catalog;
use crate::cli::ServeArgs;

pub async fn run(args: ServeArgs, logs: LogForwarder) -> Result<()> {
	let config = catalog::load(&args.config)?;
	for pattern in &args.whitelist_names {
		config.add_whitelist(catalog::name_filter(pattern));
	}
	for pattern in &args.blacklist_names {
		config.add_blacklist(catalog::name_filter(pattern));
	}

	let devices = DeviceManager::new(config);
	devices.start();

	if !args.simulated_devices.is_empty() {
		let discovery = SimulatedDiscovery::new();
		for (i, name) in args.simulated_devices.iter().enumerate() {
			discovery.add_ble(name, &format!("sim-{i}"));
		}
		devices.add_discovery(discovery);
	}

	let options = ServerOptions {
		name: args.server_name,
		max_ping_time: Duration::from_millis(args.max_ping_time),
		..ServerOptions::default()
	};

	let listener = TcpListener::bind(&args.listen)
		.await
		.with_context(|| format!("Failed to bind {}", args.listen))?;
	info!(target = "hapwire.cli", address = %args.listen, "Listening");

	let mut shutdown = Shutdown::install()?;
	let result = accept_loop(&listener, &devices, &options, &logs, &mut shutdown).await;

	devices.shutdown().await;
	result
}

/// Serves clients one at a time until a shutdown signal arrives.
async fn accept_loop(
	listener: &TcpListener,
	devices: &Arc<DeviceManager>,
	options: &ServerOptions,
	logs: &LogForwarder,
	shutdown: &mut Shutdown,
) -> Result<()> {
	loop {
		let (stream, peer) = tokio::select! {
			signal = shutdown.recv() => {
				info!(target = "hapwire.cli", signal, "Shutting down");
				return Ok(());
			}
			accept = listener.accept() => accept.context("Accept failed")?,
		};
		info!(target = "hapwire.cli", %peer, "Client connected");

		let (read, write) = stream.into_split();
		let (transport, message_rx) = PipeTransport::new(write, read);
		let session = ServerSession::new(options.clone(), Arc::clone(devices))
			.with_log_forwarder(logs.clone());

		tokio::select! {
			signal = shutdown.recv() => {
				info!(target = "hapwire.cli", signal, "Shutting down with client connected");
				return Ok(());
			}
			reason = serve(session, transport.into_transport_parts(message_rx)) => {
				info!(target = "hapwire.cli", %peer, ?reason, "Client disconnected");
			}
		}

		// Devices keep running otherwise until the next client stops them.
		devices.stop_all().await;
		if devices.is_scanning() {
			if let Err(e) = devices.stop_scanning().await {
				warn!(target = "hapwire.cli", error = %e, "Failed to stop scanning");
			}
		}
	}
}

#[cfg(unix)]
struct Shutdown {
	sigterm: tokio::signal::unix::Signal,
	sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Shutdown {
	fn install() -> Result<Self> {
		use tokio::signal::unix::{SignalKind, signal};

		Ok(Self {
			sigterm: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
			sigint: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
		})
	}

	async fn recv(&mut self) -> &'static str {
		tokio::select! {
			_ = self.sigterm.recv() => "SIGTERM",
			_ = self.sigint.recv() => "SIGINT",
		}
	}
}

#[cfg(not(unix))]
struct Shutdown;

#[cfg(not(unix))]
impl Shutdown {
	fn install() -> Result<Self> {
		Ok(Self)
	}

	async fn recv(&mut self) -> &'static str {
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!(target = "hapwire.cli", error = %e, "Ctrl+C handler failed");
			std::future::pending::<()>().await;
		}
		"Ctrl+C"
	}
}
