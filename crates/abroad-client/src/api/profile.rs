//! Current user's profile and dashboard statistics

use super::degrade;
use crate::backend::CURRENT_USER_PATH;
use crate::error::Result;
use crate::request::AuthorizedClient;
use abroad_core::{AbroadError, ProfileUpdate, User, UserStatistics};

pub const STATISTICS_PATH: &str = "/api/v1/users/me/statistics";

#[derive(Clone)]
pub struct ProfileApi {
    client: AuthorizedClient,
}

impl ProfileApi {
    pub fn new(client: AuthorizedClient) -> Self {
        Self { client }
    }

    pub async fn me(&self) -> Result<User> {
        self.client.get_json(CURRENT_USER_PATH).await
    }

    pub async fn update(&self, update: &ProfileUpdate) -> Result<User> {
        if update.is_empty() {
            return Err(AbroadError::ValidationError("nothing to update".to_string()).into());
        }
        self.client.put_json(CURRENT_USER_PATH, update).await
    }

    /// Zeroed statistics when the backend cannot provide them
    pub async fn statistics(&self) -> UserStatistics {
        degrade(self.client.get_json(STATISTICS_PATH).await, "statistics")
    }
}
