//! Error types for the data feed updater

use std::fmt::Display;

use serde_json::json;
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::Reject,
    reply::{Json, WithStatus},
    Rejection,
};

/// Type alias for Results using UpdaterError
pub type UpdaterResult<T> = Result<T, UpdaterError>;

/// The generic updater error
#[derive(Error, Debug, Clone)]
pub enum UpdaterError {
    /// The configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
    /// An error interacting with a chain RPC endpoint
    #[error("RPC error: {0}")]
    Rpc(String),
    /// An error ABI-encoding or decoding a value
    #[error("ABI error: {0}")]
    Abi(String),
    /// A transaction could not be signed or submitted
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// An operation ran out of its time budget
    #[error("Timed out: {0}")]
    Timeout(String),
    /// The HTTP API could not be served
    #[error("HTTP server error: {0}")]
    HttpServer(String),
    /// The process could not listen for its shutdown signal
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

#[allow(clippy::needless_pass_by_value)]
impl UpdaterError {
    /// Create a configuration error
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an RPC error
    pub fn rpc<T: ToString>(msg: T) -> Self {
        Self::Rpc(msg.to_string())
    }

    /// Create an ABI error
    pub fn abi<T: ToString>(msg: T) -> Self {
        Self::Abi(msg.to_string())
    }

    /// Create a transaction error
    pub fn transaction<T: ToString>(msg: T) -> Self {
        Self::Transaction(msg.to_string())
    }

    /// Create an HTTP server error
    pub fn http_server<T: ToString>(msg: T) -> Self {
        Self::HttpServer(msg.to_string())
    }

    /// Create a timeout error
    pub fn timeout<T: ToString>(msg: T) -> Self {
        Self::Timeout(msg.to_string())
    }
}

impl<E: Display> From<alloy::transports::RpcError<E>> for UpdaterError {
    fn from(e: alloy::transports::RpcError<E>) -> Self {
        UpdaterError::Rpc(e.to_string())
    }
}

impl From<alloy_sol_types::Error> for UpdaterError {
    fn from(e: alloy_sol_types::Error) -> Self {
        UpdaterError::Abi(e.to_string())
    }
}

impl From<serde_json::Error> for UpdaterError {
    fn from(e: serde_json::Error) -> Self {
        UpdaterError::Config(e.to_string())
    }
}

// --------------
// | API Errors |
// --------------

/// Errors returned to HTTP API callers
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request was malformed or referenced an unknown data feed
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[allow(clippy::needless_pass_by_value)]
impl ApiError {
    /// Create a bad request error
    pub fn bad_request<T: ToString>(msg: T) -> Self {
        Self::BadRequest(msg.to_string())
    }
}

impl Reject for ApiError {}

/// Handle rejections and convert ApiErrors to JSON responses
pub async fn handle_rejection(err: Rejection) -> Result<WithStatus<Json>, Rejection> {
    if let Some(api_error) = err.find::<ApiError>() {
        let status_code = match api_error {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        Ok(json_error(&api_error.to_string(), status_code))
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        Ok(json_error("Bad request: malformed body", StatusCode::BAD_REQUEST))
    } else {
        Err(err)
    }
}

/// Return a json error from a string message
fn json_error(msg: &str, code: StatusCode) -> WithStatus<Json> {
    let json = json!({ "error": msg });
    warp::reply::with_status(warp::reply::json(&json), code)
}
