//! Community forum posts and replies

use crate::{AbroadError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Forum post as listed by `GET /api/v1/forum/posts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub view_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reply under a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumReply {
    pub id: i64,
    pub post_id: i64,
    pub content: String,
    pub author_id: i64,
    #[serde(default)]
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// New post payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl NewPost {
    pub const MAX_TITLE_LEN: usize = 200;

    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: None,
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AbroadError::ValidationError("title is required".to_string()));
        }
        if title.chars().count() > Self::MAX_TITLE_LEN {
            return Err(AbroadError::ValidationError(format!(
                "title exceeds {} characters",
                Self::MAX_TITLE_LEN
            )));
        }
        if self.content.trim().is_empty() {
            return Err(AbroadError::ValidationError("content is required".to_string()));
        }
        Ok(())
    }
}

/// New reply payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReply {
    pub content: String,
}

impl NewReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(AbroadError::ValidationError("reply is empty".to_string()));
        }
        Ok(())
    }
}
