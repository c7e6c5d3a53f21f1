//! Authenticated request wrapper
//!
//! Every feature call goes through [`AuthorizedClient::send`], which attaches
//! the session's bearer token. A 401 on a request that carried a token gets
//! exactly one refresh through the session store and exactly one retry; if
//! the refresh fails the original 401 response is handed back untouched.
//!
//! Author: hephaex@gmail.com

use crate::backend::parse_json;
use crate::error::{ClientError, Result};
use crate::session::SessionStore;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// HTTP client bound to the session store
#[derive(Clone)]
pub struct AuthorizedClient {
    http: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl AuthorizedClient {
    pub fn new(http: Client, base_url: &str, session: Arc<SessionStore>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send the request produced by `build` with the current bearer token
    ///
    /// `build` runs once per attempt so the request can be rebuilt for the
    /// retry, bodies included.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.session.token();
        let response = self.dispatch(&build, token.as_deref()).await?;

        let Some(stale) = token else {
            return Ok(response);
        };
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "Request unauthorized, refreshing token");
        match self.session.refresh_if_current(&stale).await {
            Ok(session) => self.dispatch(&build, Some(&session.token)).await,
            Err(e) => {
                tracing::warn!(error = %e, "Could not refresh after 401");
                Ok(response)
            }
        }
    }

    async fn dispatch<F>(&self, build: &F, token: Option<&str>) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut request = build(&self.http);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    // ------------------------------------------------------------------
    // JSON helpers
    // ------------------------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.send(|http| http.get(&url)).await?;
        parse_json(response).await
    }

    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(path);
        let response = self.send(|http| http.get(&url).query(query)).await?;
        parse_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(|http| http.post(&url).json(body)).await?;
        parse_json(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(|http| http.put(&url).json(body)).await?;
        parse_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        let response = self.send(|http| http.delete(&url)).await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}
