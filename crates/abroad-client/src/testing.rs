//! In-process stand-in for the authentication backend

use crate::backend::AuthBackend;
use crate::error::{ClientError, Result};
use abroad_core::{Credentials, RegisterRequest, TokenResponse, User, UserRole};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Unsigned JWT-shaped token; `nonce` keeps successive tokens distinct
pub fn fake_token(sub: &str, exp: i64, nonce: u64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp},"jti":{nonce}}}"#))
    )
}

pub struct StubBackend {
    accounts: Mutex<HashMap<String, (String, User)>>,
    issued: Mutex<HashMap<String, String>>,
    nonce: AtomicU64,
    /// Lifetime of issued tokens in seconds
    pub token_ttl: AtomicI64,
    pub fail_refresh: AtomicBool,
    /// Issue tokens that are not JWTs
    pub opaque_tokens: AtomicBool,
    pub hold_refresh: AtomicBool,
    pub release_refresh: Notify,
    pub hold_register: AtomicBool,
    pub release_register: Notify,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            issued: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            token_ttl: AtomicI64::new(3600),
            fail_refresh: AtomicBool::new(false),
            opaque_tokens: AtomicBool::new(false),
            hold_refresh: AtomicBool::new(false),
            release_refresh: Notify::new(),
            hold_register: AtomicBool::new(false),
            release_register: Notify::new(),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_user(username: &str, password: &str) -> Self {
        let backend = Self::new();
        backend.add_account(username, password, UserRole::User);
        backend
    }

    fn add_account(&self, username: &str, password: &str, role: UserRole) -> User {
        let mut accounts = self.accounts.lock().unwrap();
        let user: User = serde_json::from_value(serde_json::json!({
            "id": accounts.len() as i64 + 1,
            "username": username,
            "email": format!("{username}@example.com"),
            "role": role.as_str(),
        }))
        .unwrap();
        accounts.insert(username.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Issue a valid token for `username` outside the login flow
    pub fn issue_token(&self, username: &str) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let exp = Utc::now().timestamp() + self.token_ttl.load(Ordering::SeqCst);
        let token = if self.opaque_tokens.load(Ordering::SeqCst) {
            format!("opaque-{nonce}")
        } else {
            fake_token(username, exp, nonce)
        };
        self.issued
            .lock()
            .unwrap()
            .insert(token.clone(), username.to_string());
        token
    }

    fn token_response(&self, username: &str) -> TokenResponse {
        TokenResponse {
            access_token: self.issue_token(username),
            token_type: "bearer".to_string(),
            expires_in: Some(self.token_ttl.load(Ordering::SeqCst) as u64),
        }
    }

    fn owner(&self, token: &str) -> Option<String> {
        self.issued.lock().unwrap().get(token).cloned()
    }
}

#[async_trait]
impl AuthBackend for StubBackend {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let valid = self
            .accounts
            .lock()
            .unwrap()
            .get(&credentials.username)
            .is_some_and(|(password, _)| *password == credentials.password);
        if !valid {
            return Err(ClientError::Unauthorized(
                "Incorrect username or password".to_string(),
            ));
        }
        Ok(self.token_response(&credentials.username))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<User> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_register.load(Ordering::SeqCst) {
            self.release_register.notified().await;
        }
        if self.accounts.lock().unwrap().contains_key(&request.username) {
            return Err(ClientError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                message: "Username already registered".to_string(),
            });
        }
        Ok(self.add_account(
            &request.username,
            &request.password,
            request.role.unwrap_or_default(),
        ))
    }

    async fn current_user(&self, token: &str) -> Result<User> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let username = self
            .owner(token)
            .ok_or_else(|| ClientError::Unauthorized("Could not validate credentials".into()))?;
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts[&username].1.clone())
    }

    async fn refresh(&self, token: &str) -> Result<TokenResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.release_refresh.notified().await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized("Token refresh rejected".into()));
        }
        let username = self
            .owner(token)
            .ok_or_else(|| ClientError::Unauthorized("Unknown token".into()))?;
        Ok(self.token_response(&username))
    }
}
