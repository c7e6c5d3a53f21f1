//! Mentor search

use crate::error::Result;
use crate::request::AuthorizedClient;
use abroad_core::{Mentor, MentorSearchQuery};

pub const SEARCH_PATH: &str = "/api/v1/mentors/search";
pub const MENTORS_PATH: &str = "/api/v1/mentors";

#[derive(Clone)]
pub struct MentorApi {
    client: AuthorizedClient,
}

impl MentorApi {
    pub fn new(client: AuthorizedClient) -> Self {
        Self { client }
    }

    /// Server-side search; the filter is validated before anything is sent
    pub async fn search(&self, query: &MentorSearchQuery) -> Result<Vec<Mentor>> {
        query.filter.validate()?;
        let pairs = query.to_query_pairs();
        tracing::debug!(params = pairs.len(), "Searching mentors");
        self.client.get_json_with_query(SEARCH_PATH, &pairs).await
    }

    pub async fn get(&self, id: i64) -> Result<Mentor> {
        self.client.get_json(&format!("{MENTORS_PATH}/{id}")).await
    }
}
