//! Command dispatch.

use std::path::Path;
use std::time::Instant;

use chainprobe_runtime::{LaunchSettings, LaunchTimings};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, RunArgs};
use crate::clients;
use crate::error::{HarnessError, Result};
use crate::output::{self, ClientListing, CommandResult, OutputFormat};
use crate::runner::{RunOptions, RunReport, Runner};

/// Runs the parsed command and prints its result.
///
/// Returns `Ok(false)` when the command ran but found failures.
pub async fn dispatch(cli: Cli) -> Result<bool> {
	let datadir = cli.datadir.clone().unwrap_or_else(clients::default_datadir);
	match cli.command {
		Commands::Run(args) => {
			let started = Instant::now();
			let report = run(&datadir, &args).await?;
			let ok = report.is_success();
			let result = CommandResult::success("run", report).with_duration(started.elapsed());
			output::print_result(&result, cli.format, output::render_run_text);
			Ok(ok)
		}
		Commands::Clients => {
			let listings = list_clients(&datadir)?;
			output::print_result(&CommandResult::success("clients", listings), cli.format, |listings| {
				output::render_clients_text(listings)
			});
			Ok(true)
		}
	}
}

pub fn run_options(args: &RunArgs) -> RunOptions {
	RunOptions {
		threads: args.threads,
		units: args.units.unwrap_or(args.threads),
		methods: args.methods.clone(),
		launch: LaunchSettings {
			timings: LaunchTimings::default(),
			client_output: args.client_output,
			nodes_override: args.nodes.clone(),
			..LaunchSettings::default()
		},
	}
}

/// Loads the selected clients and runs them, stopping cleanly on Ctrl+C.
pub async fn run(datadir: &Path, args: &RunArgs) -> Result<RunReport> {
	let selected = clients::select(clients::discover(datadir)?, &args.clients)?;
	info!(
		target = "chainprobe.runner",
		datadir = %datadir.display(),
		clients = selected.len(),
		threads = args.threads,
		"starting run"
	);

	let runner = Runner::new(selected, run_options(args));
	let work = runner.run();
	tokio::pin!(work);

	let outcome = tokio::select! {
		report = &mut work => report,
		_ = tokio::signal::ctrl_c() => {
			warn!(target = "chainprobe.runner", "received Ctrl+C, stopping workers");
			runner.cancel();
			let _ = work.await;
			Err(HarnessError::Interrupted)
		}
	};

	runner.clear().await?;
	outcome
}

pub fn list_clients(datadir: &Path) -> Result<Vec<ClientListing>> {
	Ok(clients::discover(datadir)?
		.into_iter()
		.map(|config| ClientListing {
			name: config.name.clone(),
			transport: config.transport.to_string(),
			addresses: config.addresses().to_vec(),
			launch_script: config.launch_script().map(|script| script.display().to_string()),
		})
		.collect())
}

/// Prints `err` to stderr and, in JSON mode, as a failure envelope on stdout.
pub fn report_error(command: &str, err: &HarnessError, format: OutputFormat) {
	let command_error = err.to_command_error();
	output::print_error_stderr(&command_error);
	if format == OutputFormat::Json {
		let result: CommandResult<()> = CommandResult::failure(command, command_error);
		output::print_result(&result, format, |_| String::new());
	}
}
