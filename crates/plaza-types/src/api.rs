use serde::{Deserialize, Serialize};

use crate::models::{Chatroom, ChatroomId, ListFilter, Message, User, UserId};

// -- Envelope --

/// Every REST response is wrapped as `{ success, data, msg }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl<T> Envelope<T> {
    /// `success=false` becomes `Err(msg)`. A successful envelope without data is also
    /// an error unless the caller expects none (see [`Envelope::into_unit`]).
    pub fn into_result(self) -> Result<T, String> {
        if !self.success {
            return Err(self.msg.unwrap_or_else(|| "Request failed.".into()));
        }
        self.data
            .ok_or_else(|| self.msg.unwrap_or_else(|| "Response carried no data.".into()))
    }

    pub fn into_unit(self) -> Result<(), String> {
        if self.success {
            Ok(())
        } else {
            Err(self.msg.unwrap_or_else(|| "Request failed.".into()))
        }
    }
}

// -- Pagination --

/// Cursor fields reported by a paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub page_index: u32,
    pub total_pages: u32,
    pub total_records: u64,
}

/// One page of a listing.
///
/// Some endpoints (chatrooms and comments in older revisions) answer with a bare
/// array instead of the paged object; that is read as a single complete page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "PageRepr<T>")]
pub struct Page<T> {
    pub records: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn single(records: Vec<T>) -> Self {
        let total_records = records.len() as u64;
        Self {
            records,
            meta: PageMeta { page_index: 1, total_pages: 1, total_records },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageRepr<T> {
    Paged {
        #[serde(default = "Vec::new")]
        records: Vec<T>,
        #[serde(rename = "pageIndex", alias = "page_index", default)]
        page_index: Option<u32>,
        #[serde(rename = "totalPages", alias = "total_pages", default)]
        total_pages: Option<u32>,
        #[serde(rename = "totalRecords", alias = "total_records", default)]
        total_records: Option<u64>,
    },
    Bare(Vec<T>),
}

impl<T> From<PageRepr<T>> for Page<T> {
    fn from(repr: PageRepr<T>) -> Self {
        match repr {
            PageRepr::Paged { records, page_index, total_pages, total_records } => Page {
                meta: PageMeta {
                    page_index: page_index.unwrap_or(1).max(1),
                    total_pages: total_pages.unwrap_or(1).max(1),
                    total_records: total_records.unwrap_or(records.len() as u64),
                },
                records,
            },
            PageRepr::Bare(records) => Page::single(records),
        }
    }
}

// -- Queries --

#[derive(Debug, Clone, Serialize)]
pub struct PageQuery {
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatroomQuery {
    pub filter: ListFilter,
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationQuery {
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    pub filter: ListFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserQuery {
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

// -- Posts --

#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub post_content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharePost {
    pub share_caption: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub comment_content: String,
}

// -- Messages --

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub message_chatroom_id: ChatroomId,
    pub message_receiver_id: UserId,
    pub message_content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SentMessage {
    Nested { message: Message },
    Flat(Message),
}

impl SentMessage {
    pub fn into_message(self) -> Message {
        match self {
            Self::Nested { message } => message,
            Self::Flat(message) => message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateChatroomRequest {
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedChatroom {
    pub chatroom: Chatroom,
}

// -- Auth --

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub user_fname: String,
    pub user_lname: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

impl AuthPayload {
    /// Personal access tokens come back as `<id>|<secret>`; only the secret is a bearer token.
    pub fn bearer_token(&self) -> &str {
        normalize_token(&self.token)
    }
}

pub fn normalize_token(raw: &str) -> &str {
    match raw.split_once('|') {
        Some((_, secret)) => secret,
        None => raw,
    }
}
