use clap::Parser;
use hapwire::server::LogForwarder;
use hapwire_cli::{cli::Cli, commands, logging, styles};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let logs = LogForwarder::new();
	logging::init_logging(cli.verbose, &logs);

	if let Err(err) = commands::dispatch(cli.command, logs).await {
		eprintln!("{} {err:#}", styles::error_label());
		std::process::exit(1);
	}
}
