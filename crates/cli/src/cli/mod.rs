
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;
use crate::runner::DEFAULT_METHOD;

/// Root CLI for chainprobe.
#[derive(Parser, Debug)]
#[command(name = "chainprobe")]
#[command(about = "Drive blockchain clients over JSON-RPC from a pool of worker threads")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Directory holding one sub-directory per client (default: ~/.chainprobe)
	#[arg(long, global = true, value_name = "DIR")]
	pub datadir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run test units against one or more clients.
	Run(RunArgs),
	/// List the client configurations found in the data directory.
	Clients,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
	/// Worker threads, and the most client sessions alive at once.
	#[arg(short = 'j', long, value_name = "N", default_value_t = 1, value_parser = parse_threads)]
	pub threads: usize,

	/// Clients to run, comma separated (default: every discovered client).
	#[arg(long, value_name = "NAMES", value_delimiter = ',')]
	pub clients: Vec<String>,

	/// Network addresses to use instead of the ones in the client configs.
	#[arg(long, value_name = "ADDRS", value_delimiter = ',')]
	pub nodes: Vec<String>,

	/// Show client stdout/stderr.
	#[arg(long)]
	pub client_output: bool,

	/// Test units per client (default: one per thread).
	#[arg(long, value_name = "N")]
	pub units: Option<usize>,

	/// JSON-RPC method called in every unit; repeat for several.
	#[arg(long = "method", value_name = "METHOD", default_value = DEFAULT_METHOD)]
	pub methods: Vec<String>,
}

fn parse_threads(value: &str) -> Result<usize, String> {
	match value.parse::<usize>() {
		Ok(0) => Err("at least one worker thread is required".to_string()),
		Ok(threads) => Ok(threads),
		Err(e) => Err(e.to_string()),
	}
}
