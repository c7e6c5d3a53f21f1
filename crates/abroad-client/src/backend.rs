//! Backend authentication contract
//!
//! The session store talks to the backend only through [`AuthBackend`],
//! so the lifecycle can be driven against the real HTTP API or a stub.
//!
//! Author: hephaex@gmail.com

use crate::error::{ClientError, Result};
use abroad_core::{ApiConfig, Credentials, RegisterRequest, TokenResponse, User};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REGISTER_PATH: &str = "/api/v1/auth/register";
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";
pub const CURRENT_USER_PATH: &str = "/api/v1/users/me";

/// Authentication endpoints the session lifecycle depends on
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for an access token
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse>;

    /// Create an account; does not log in
    async fn register(&self, request: &RegisterRequest) -> Result<User>;

    /// Resolve the user a token belongs to
    async fn current_user(&self, token: &str) -> Result<User>;

    /// Trade a (possibly stale) token for a fresh one
    async fn refresh(&self, token: &str) -> Result<TokenResponse>;
}

/// [`AuthBackend`] over the backend's REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create from config
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, &config.base_url))
    }

    /// Use an existing HTTP client
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a JSON body or turn the response into a [`ClientError`]
pub(crate) async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(ClientError::from_response(response).await);
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        parse_json(response).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(request)
            .send()
            .await?;

        parse_json(response).await
    }

    async fn current_user(&self, token: &str) -> Result<User> {
        let response = self
            .client
            .get(self.url(CURRENT_USER_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        parse_json(response).await
    }

    async fn refresh(&self, token: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        parse_json(response).await
    }
}
