//! Abroad Core - Domain models and shared types
//!
//! This crate defines the records exchanged with the mentoring backend:
//! - Users, roles and dashboard statistics
//! - Authentication payloads (credentials, registration, token responses)
//! - Mentors and the in-memory mentor filter
//! - Forum posts and replies
//! - AI advisor chat sessions and messages
//! - Configuration management

pub mod auth;
pub mod chat;
pub mod config;
pub mod forum;
pub mod mentor;

pub use auth::{Credentials, RegisterRequest, TokenResponse};
pub use chat::{ChatMessage, ChatRole, ChatSession};
pub use config::{ApiConfig, AppConfig, ConfigError, LoggingConfig, SessionConfig};
pub use forum::{ForumPost, ForumReply, NewPost, NewReply};
pub use mentor::{Mentor, MentorFilter, MentorSearchQuery, SortBy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Abroad operations
#[derive(Error, Debug)]
pub enum AbroadError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AbroadError>;

// ============================================================================
// Users
// ============================================================================

/// Account role on the marketplace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Student,
    Mentor,
    Admin,
    #[serde(other)]
    Unknown,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Student => "student",
            Self::Mentor => "mentor",
            Self::Admin => "admin",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = AbroadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "student" => Ok(Self::Student),
            "mentor" => Ok(Self::Mentor),
            "admin" => Ok(Self::Admin),
            other => Err(AbroadError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

/// User record as returned by `GET /api/v1/users/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Profile fields (all optional on the wire)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Name to show in prompts and listings
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    pub fn is_mentor(&self) -> bool {
        self.role == UserRole::Mentor
    }
}

/// Partial profile update, `PUT /api/v1/users/me`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.university.is_none()
            && self.major.is_none()
            && self.bio.is_none()
    }
}

/// Dashboard counters; zeroed when the backend cannot be reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStatistics {
    pub sessions_completed: u32,
    pub upcoming_sessions: u32,
    pub forum_posts: u32,
    pub chat_sessions: u32,
    pub hours_mentored: f64,
}

/// Result of `POST /api/v1/files/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
