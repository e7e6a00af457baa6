//! JSON-RPC 2.0 envelopes and the gateway method names.

use crate::error::{GatewayError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_REGISTERED_ADDRESSES: &str = "holo_registeredAddresses";
pub const METHOD_GET_HOLO: &str = "holo_getHolo";
pub const METHOD_GET_PROFILE: &str = "holo_getProfile";
pub const METHOD_GET_CREDENTIAL: &str = "holo_getCredential";
pub const METHOD_ADDRESS_FOR_CREDENTIALS: &str = "holo_addressForCredentials";
pub const METHOD_POLL_EVENTS: &str = "holo_pollEvents";

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Extracts `result`, turning a JSON-RPC error object into `ApiError`.
    /// A `null` result decodes as the target type's null (e.g. `None`).
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if let Some(error) = self.error {
            return Err(GatewayError::ApiError {
                code: error.code,
                message: error.message,
            });
        }
        match self.result {
            Some(value) => serde_json::from_value(value).map_err(GatewayError::JsonError),
            None => serde_json::from_value(Value::Null).map_err(|_| GatewayError::EmptyResponse),
        }
    }
}

/// Page returned by `holo_pollEvents`.
#[derive(Debug, Deserialize)]
pub struct EventPage {
    pub cursor: u64,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_object_becomes_api_error() {
        let response: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        let err = response.into_result::<Vec<String>>().unwrap_err();
        assert!(matches!(err, GatewayError::ApiError { code: -32601, .. }));
    }

    #[test]
    fn missing_result_is_null() {
        let response: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert_eq!(response.into_result::<Option<String>>().unwrap(), None);

        let response: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(
            response.into_result::<Vec<String>>(),
            Err(GatewayError::EmptyResponse)
        ));
    }

    #[test]
    fn request_serializes_as_jsonrpc() {
        let request = RpcRequest::new(7, METHOD_GET_HOLO, json!(["0xabc"]));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "holo_getHolo");
        assert_eq!(value["params"][0], "0xabc");
    }
}
