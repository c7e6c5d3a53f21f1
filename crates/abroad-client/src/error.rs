//! Client error handling
//!
//! Author: hephaex@gmail.com

use crate::storage::StorageError;
use crate::token::TokenError;
use abroad_core::AbroadError;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the backend
///
/// The backend answers either `{"detail": "..."}` or
/// `{"code": "...", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Best human-readable message in the body
    pub fn message(&self) -> Option<String> {
        if let Some(message) = &self.message {
            return Some(message.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            // Validation errors come back as a list of {loc, msg, type}
            Some(serde_json::Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!msgs.is_empty()).then(|| msgs.join("; "))
            }
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }
}

/// Errors surfaced by the client library
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("No token available")]
    NoToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session changed while the operation was in flight")]
    Superseded,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Core(#[from] AbroadError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Build an error from a non-success response, consuming its body
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.message())
            .unwrap_or_else(|| {
                if text.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text
                }
            });

        if status == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized(message)
        } else {
            ClientError::Status { status, message }
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
