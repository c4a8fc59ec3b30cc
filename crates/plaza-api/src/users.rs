use async_trait::async_trait;
use reqwest::Method;

use plaza_types::api::UserQuery;
use plaza_types::{Page, User};

use crate::client::RestClient;
use crate::error::ApiError;

/// User directory used by the recipient picker.
#[async_trait]
pub trait UsersApi: Send + Sync {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Page<User>, ApiError>;
}

#[async_trait]
impl UsersApi for RestClient {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Page<User>, ApiError> {
        self.fetch(self.request(Method::GET, "/users").query(query)).await
    }
}
