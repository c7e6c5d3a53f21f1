//! Application entry point for the client library
//!
//! [`AbroadClient::bootstrap`] runs once per process: it restores the
//! session from durable storage, starts the refresh monitor and hands out
//! the feature APIs. When it returns the session is initialized.
//!
//! Author: hephaex@gmail.com

use crate::api::{ChatApi, FileApi, ForumApi, MentorApi, ProfileApi};
use crate::backend::HttpBackend;
use crate::error::Result;
use crate::monitor::{self, MonitorConfig, RefreshMonitor};
use crate::request::AuthorizedClient;
use crate::session::{Session, SessionStore};
use crate::storage::SessionStorage;
use abroad_core::AppConfig;
use std::sync::Arc;

/// Bootstrapped client: session, monitor and feature APIs
pub struct AbroadClient {
    config: AppConfig,
    session: Arc<SessionStore>,
    http: AuthorizedClient,
    monitor: Option<RefreshMonitor>,
}

impl AbroadClient {
    /// Build the HTTP backend from `config` and bootstrap over it
    pub async fn bootstrap(config: AppConfig, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let backend = HttpBackend::from_config(&config.api)?;
        Ok(Self::bootstrap_with_backend(config, backend, storage).await)
    }

    /// Bootstrap over an already configured backend
    pub async fn bootstrap_with_backend(
        config: AppConfig,
        backend: HttpBackend,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let http_client = backend.client().clone();
        let base_url = backend.base_url().to_string();

        let session = Arc::new(SessionStore::new(Arc::new(backend), storage));
        let state = session.initialize().await;
        tracing::info!(state = state.name(), "Session bootstrapped");

        let monitor = config.session.monitor_enabled.then(|| {
            RefreshMonitor::spawn(session.clone(), MonitorConfig::from(&config.session))
        });

        Self {
            http: AuthorizedClient::new(http_client, &base_url, session.clone()),
            config,
            session,
            monitor,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn http(&self) -> &AuthorizedClient {
        &self.http
    }

    pub fn monitor(&self) -> Option<&RefreshMonitor> {
        self.monitor.as_ref()
    }

    /// Refresh now; a failure logs the session out
    pub async fn refresh_now(&self) -> Result<Session> {
        match &self.monitor {
            Some(monitor) => monitor.refresh_now().await,
            None => monitor::refresh_or_expire(&self.session).await,
        }
    }

    pub fn mentors(&self) -> MentorApi {
        MentorApi::new(self.http.clone())
    }

    pub fn forum(&self) -> ForumApi {
        ForumApi::new(self.http.clone())
    }

    pub fn chat(&self) -> ChatApi {
        ChatApi::new(self.http.clone())
    }

    pub fn profile(&self) -> ProfileApi {
        ProfileApi::new(self.http.clone())
    }

    pub fn files(&self) -> FileApi {
        FileApi::new(self.http.clone())
    }

    /// Stop background work
    pub async fn shutdown(mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }
    }
}
