use holostore::errors::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("gateway returned error {code}: {message}")]
    ApiError { code: i64, message: String },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("response carried neither result nor error")]
    EmptyResponse,

    #[error("no endpoint configured for chain '{0}'")]
    UnknownChain(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RequestError(inner) if inner.is_timeout() => RpcError::Timeout,
            GatewayError::RequestError(inner) if inner.is_decode() => {
                RpcError::Malformed(inner.to_string())
            }
            GatewayError::RequestError(inner) => RpcError::Unavailable(inner.to_string()),
            err @ GatewayError::ApiError { .. } => RpcError::Unavailable(err.to_string()),
            err @ GatewayError::UnknownChain(_) => RpcError::Unavailable(err.to_string()),
            err @ (GatewayError::JsonError(_) | GatewayError::EmptyResponse) => {
                RpcError::Malformed(err.to_string())
            }
        }
    }
}
