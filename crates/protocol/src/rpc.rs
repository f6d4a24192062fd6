//! Minimal JSON-RPC 2.0 envelope exchanged with a client session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
	pub jsonrpc: String,
	pub id: u64,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl RpcRequest {
	pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			method: method.into(),
			params: match params {
				Value::Null => Value::Array(Vec::new()),
				other => other,
			},
		}
	}
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Response read back from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
	#[serde(default)]
	pub jsonrpc: String,
	#[serde(default)]
	pub id: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
}

impl RpcResponse {
	pub fn success(id: u64, result: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id: Some(id),
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id: Some(id),
			result: None,
			error: Some(RpcError {
				code,
				message: message.into(),
				data: None,
			}),
		}
	}

	/// Splits the response into its result or error.
	pub fn into_result(self) -> Result<Value, RpcError> {
		match self.error {
			Some(err) => Err(err),
			None => Ok(self.result.unwrap_or(Value::Null)),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn null_params_become_empty_array() {
		let request = RpcRequest::new(7, "web3_clientVersion", Value::Null);
		let encoded = serde_json::to_value(&request).unwrap();
		assert_eq!(encoded, json!({"jsonrpc":"2.0","id":7,"method":"web3_clientVersion","params":[]}));
	}

	#[test]
	fn error_response_maps_to_err() {
		let response: RpcResponse =
			serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"method not found"}}"#).unwrap();
		let err = response.into_result().unwrap_err();
		assert_eq!(err.code, -32601);
		assert_eq!(err.message, "method not found");
	}

	#[test]
	fn missing_result_is_null() {
		let response: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
		assert_eq!(response.into_result().unwrap(), Value::Null);
	}
}
