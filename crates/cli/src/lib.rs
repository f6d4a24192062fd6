//! chainprobe command-line harness: client discovery, worker pool, output.

pub mod cli;
pub mod clients;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod runner;
