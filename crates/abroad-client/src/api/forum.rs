//! Community forum

use crate::error::Result;
use crate::request::AuthorizedClient;
use abroad_core::{ForumPost, ForumReply, NewPost, NewReply};

pub const POSTS_PATH: &str = "/api/v1/forum/posts";

/// Posts per page
pub const PAGE_SIZE: u32 = 20;

#[derive(Clone)]
pub struct ForumApi {
    client: AuthorizedClient,
}

impl ForumApi {
    pub fn new(client: AuthorizedClient) -> Self {
        Self { client }
    }

    /// One page of posts, newest first; pages start at 1
    pub async fn list_posts(&self, page: u32) -> Result<Vec<ForumPost>> {
        let query = [("page", page.max(1)), ("limit", PAGE_SIZE)];
        self.client.get_json_with_query(POSTS_PATH, &query).await
    }

    pub async fn get_post(&self, id: i64) -> Result<ForumPost> {
        self.client.get_json(&format!("{POSTS_PATH}/{id}")).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<ForumPost> {
        post.validate()?;
        let created: ForumPost = self.client.post_json(POSTS_PATH, post).await?;
        tracing::info!(post_id = created.id, "Forum post created");
        Ok(created)
    }

    pub async fn list_replies(&self, post_id: i64) -> Result<Vec<ForumReply>> {
        self.client
            .get_json(&format!("{POSTS_PATH}/{post_id}/replies"))
            .await
    }

    pub async fn reply(&self, post_id: i64, reply: &NewReply) -> Result<ForumReply> {
        reply.validate()?;
        self.client
            .post_json(&format!("{POSTS_PATH}/{post_id}/replies"), reply)
            .await
    }
}
