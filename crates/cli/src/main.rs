use chainprobe_cli::cli::{Cli, Commands};
use chainprobe_cli::{commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = match cli.command {
		Commands::Run(_) => "run",
		Commands::Clients => "clients",
	};

	match commands::dispatch(cli).await {
		Ok(true) => {}
		Ok(false) => std::process::exit(1),
		Err(err) => {
			commands::report_error(command, &err, format);
			std::process::exit(1);
		}
	}
}
