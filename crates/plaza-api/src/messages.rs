use async_trait::async_trait;
use reqwest::Method;

use plaza_types::api::{ChatroomQuery, CreateChatroomRequest, CreatedChatroom, SendMessageRequest, SentMessage};
use plaza_types::{Chatroom, ChatroomId, ListFilter, Message, Page, UserId};

use crate::client::RestClient;
use crate::error::ApiError;

/// Chatrooms and direct messages.
#[async_trait]
pub trait MessagesApi: Send + Sync {
    async fn fetch_chatrooms(&self, filter: ListFilter, page_index: u32) -> Result<Page<Chatroom>, ApiError>;

    /// Transcript of one chatroom, latest message first.
    async fn fetch_transcript(&self, chatroom_id: ChatroomId) -> Result<Page<Message>, ApiError>;

    async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, ApiError>;

    async fn mark_read(&self, chatroom_id: ChatroomId) -> Result<(), ApiError>;

    async fn create_chatroom(&self, receiver_id: UserId) -> Result<Chatroom, ApiError>;
}

#[async_trait]
impl MessagesApi for RestClient {
    async fn fetch_chatrooms(&self, filter: ListFilter, page_index: u32) -> Result<Page<Chatroom>, ApiError> {
        let req = self
            .request(Method::GET, "/messages")
            .query(&ChatroomQuery { filter, page_index });
        self.fetch(req).await
    }

    async fn fetch_transcript(&self, chatroom_id: ChatroomId) -> Result<Page<Message>, ApiError> {
        self.fetch(self.request(Method::GET, &format!("/messages/{}", chatroom_id))).await
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, ApiError> {
        let sent: SentMessage = self.fetch(self.request(Method::POST, "/messages/").json(req)).await?;
        Ok(sent.into_message())
    }

    async fn mark_read(&self, chatroom_id: ChatroomId) -> Result<(), ApiError> {
        self.execute(self.request(Method::PATCH, &format!("/messages/{}/mark-read", chatroom_id)))
            .await
    }

    async fn create_chatroom(&self, receiver_id: UserId) -> Result<Chatroom, ApiError> {
        let req = self
            .request(Method::POST, "/messages/create-chatroom")
            .json(&CreateChatroomRequest { receiver_id });
        let created: CreatedChatroom = self.fetch(req).await?;
        Ok(created.chatroom)
    }
}
