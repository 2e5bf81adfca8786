//! MCP Message Validation
//!
//! Structural checks on incoming JSON before it is dispatched: the JSON-RPC
//! envelope and the parameters of the methods the server implements.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use serde_json::{Map, Value};
use tracing::debug;

/// Validator for incoming MCP messages
#[derive(Debug, Default)]
pub struct McpValidator;

impl McpValidator {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Check a raw JSON value and classify it as a JSON-RPC message
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> McpResult<JsonRpcMessage> {
        let object = value.as_object().ok_or_else(|| McpError::InvalidRequest {
            message: "message must be a JSON object".to_string(),
        })?;

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            _ => {
                return Err(McpError::InvalidRequest {
                    message: format!("jsonrpc must be \"{JSONRPC_VERSION}\""),
                });
            }
        }

        if let Some(id) = object.get("id") {
            check_id(id)?;
        }

        let message = if object.contains_key("method") {
            let method = object
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::InvalidRequest {
                    message: "method must be a string".to_string(),
                })?;

            if let Some(params) = object.get("params") {
                self.validate_method_params(method, params)?;
            }

            if object.get("id").is_some_and(|id| !id.is_null()) {
                JsonRpcMessage::Request(parse(value)?)
            } else {
                JsonRpcMessage::Notification(parse(value)?)
            }
        } else if object.contains_key("result") {
            JsonRpcMessage::Response(parse(value)?)
        } else if object.contains_key("error") {
            JsonRpcMessage::ErrorResponse(parse(value)?)
        } else {
            return Err(McpError::InvalidRequest {
                message: "value does not match any known JSON-RPC message type".to_string(),
            });
        };

        Ok(message)
    }

    /// Validate method-specific parameters
    #[inline]
    pub fn validate_method_params(&self, method: &str, params: &Value) -> McpResult<()> {
        match method {
            "initialize" => {
                let params = expect_object(params, "initialize params")?;
                require_str(params, "protocolVersion")?;
                let client_info = params
                    .get("clientInfo")
                    .ok_or_else(|| missing("clientInfo"))
                    .and_then(|info| expect_object(info, "clientInfo"))?;
                require_str(client_info, "name")?;
                require_str(client_info, "version")?;
                Ok(())
            }
            "tools/call" => {
                let params = expect_object(params, "tools/call params")?;
                require_str(params, "name")?;
                match params.get("arguments") {
                    None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
                    Some(_) => Err(McpError::ValidationError {
                        message: "arguments must be an object".to_string(),
                    }),
                }
            }
            "notifications/cancelled" => {
                let params = expect_object(params, "cancellation params")?;
                let id = params.get("requestId").ok_or_else(|| missing("requestId"))?;
                match id {
                    Value::Null => Err(McpError::ValidationError {
                        message: "requestId cannot be null".to_string(),
                    }),
                    id => check_id(id),
                }
            }
            _ => {
                debug!("No parameter validation for method: {}", method);
                Ok(())
            }
        }
    }
}

fn check_id(id: &Value) -> McpResult<()> {
    match id {
        Value::String(_) | Value::Null => Ok(()),
        Value::Number(number) if number.is_i64() => Ok(()),
        _ => Err(McpError::InvalidRequest {
            message: "id must be a string or an integer".to_string(),
        }),
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: &Value) -> McpResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| McpError::InvalidRequest {
        message: e.to_string(),
    })
}

fn expect_object<'a>(value: &'a Value, what: &str) -> McpResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| McpError::ValidationError {
        message: format!("{what} must be an object"),
    })
}

fn require_str(object: &Map<String, Value>, key: &str) -> McpResult<()> {
    match object.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(McpError::ValidationError {
            message: format!("{key} must be a string"),
        }),
        None => Err(missing(key)),
    }
}

fn missing(key: &str) -> McpError {
    McpError::ValidationError {
        message: format!("missing required field: {key}"),
    }
}
