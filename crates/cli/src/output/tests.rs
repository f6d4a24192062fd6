use std::time::Duration;

use super::*;
use crate::runner::UnitFailure;

fn report() -> RunReport {
	RunReport {
		clients: vec![
			ClientReport {
				client: "geth".into(),
				transport: "ipc".into(),
				units: 4,
				failed_units: 0,
				sessions_launched: 2,
				duration_ms: 3200,
				failures: vec![],
			},
			ClientReport {
				client: "besu".into(),
				transport: "tcp".into(),
				units: 2,
				failed_units: 1,
				sessions_launched: 2,
				duration_ms: 120,
				failures: vec![UnitFailure {
					unit: 1,
					thread: "worker-1".into(),
					method: "eth_chainId".into(),
					message: "rpc error -32601: method not found".into(),
				}],
			},
		],
	}
}

#[test]
fn success_envelope_shape() {
	let result = CommandResult::success("run", report()).with_duration(Duration::from_millis(3400));
	let json: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();

	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "run");
	assert_eq!(json["timings"]["durationMs"], 3400);
	assert_eq!(json["data"]["clients"][0]["sessionsLaunched"], 2);
	assert!(json["data"]["clients"][0].get("failures").is_none());
	assert_eq!(json["data"]["clients"][1]["failures"][0]["method"], "eth_chainId");
	assert!(json.get("error").is_none());
}

#[test]
fn failure_envelope_shape() {
	let result: CommandResult<()> = CommandResult::failure(
		"run",
		CommandError {
			code: ErrorCode::PoolFailure,
			message: "client 'geth' took too long to start".into(),
			details: None,
		},
	);
	let json: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();

	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "POOL_FAILURE");
	assert!(json.get("data").is_none());
}

#[test]
fn run_text_lists_clients_and_failures() {
	let text = render_run_text(&report());
	let lines: Vec<&str> = text.lines().collect();

	assert_eq!(lines[0], "geth (ipc): 4 units, 0 failed, 2 sessions launched in 3.2s");
	assert_eq!(lines[1], "besu (tcp): 2 units, 1 failed, 2 sessions launched in 0.1s");
	assert_eq!(lines[2], "  unit 1 on worker-1: eth_chainId failed: rpc error -32601: method not found");
	assert_eq!(lines[3], "FAILED: 2 clients, 6 units, 1 with failures");
}

#[test]
fn clients_text_shows_addresses_and_script() {
	let text = render_clients_text(&[
		ClientListing {
			name: "geth".into(),
			transport: "ipc".into(),
			addresses: vec![],
			launch_script: Some("/data/geth/start.sh".into()),
		},
		ClientListing {
			name: "besu".into(),
			transport: "tcp".into(),
			addresses: vec!["10.0.0.1:8545".into(), "10.0.0.2:8545".into()],
			launch_script: None,
		},
	]);

	assert!(text.contains("geth") && text.contains("(/data/geth/start.sh)"));
	assert!(text.contains("10.0.0.1:8545,10.0.0.2:8545"));
}

#[test]
fn error_code_display_matches_serde() {
	for code in [ErrorCode::ConfigError, ErrorCode::PoolFailure, ErrorCode::Interrupted] {
		let json = serde_json::to_value(code).unwrap();
		assert_eq!(json, code.to_string());
	}
}
