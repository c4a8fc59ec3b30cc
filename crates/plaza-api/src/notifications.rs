use async_trait::async_trait;
use reqwest::Method;

use plaza_types::api::NotificationQuery;
use plaza_types::{ListFilter, Notification, NotificationId, Page};

use crate::client::RestClient;
use crate::error::ApiError;

#[async_trait]
pub trait NotificationsApi: Send + Sync {
    async fn fetch_notifications(
        &self,
        filter: ListFilter,
        page_index: u32,
        page_size: u32,
    ) -> Result<Page<Notification>, ApiError>;

    async fn mark_read(&self, notification_id: NotificationId) -> Result<(), ApiError>;

    async fn mark_all_read(&self) -> Result<(), ApiError>;
}

#[async_trait]
impl NotificationsApi for RestClient {
    async fn fetch_notifications(
        &self,
        filter: ListFilter,
        page_index: u32,
        page_size: u32,
    ) -> Result<Page<Notification>, ApiError> {
        let req = self
            .request(Method::GET, "/notifications")
            .query(&NotificationQuery { page_index, page_size, filter });
        self.fetch(req).await
    }

    async fn mark_read(&self, notification_id: NotificationId) -> Result<(), ApiError> {
        self.execute(self.request(Method::PATCH, &format!("/notifications/read/{}", notification_id)))
            .await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.execute(self.request(Method::PATCH, "/notifications/read-all")).await
    }
}
