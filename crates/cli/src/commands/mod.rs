mod check;
mod serve;

use anyhow::Result;
use hapwire::server::LogForwarder;

use crate::cli::Commands;

pub async fn dispatch(command: Commands, logs: LogForwarder) -> Result<()> {
	match command {
		Commands::Serve(args) => serve::run(args, logs).await,
		Commands::CheckConfig(args) => check::run(&args),
	}
}
