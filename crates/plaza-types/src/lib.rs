pub mod api;
pub mod events;
pub mod models;
mod wire;

pub use api::{Envelope, Page, PageMeta};
pub use events::{EventKind, PushEvent, Topic};
pub use models::{
    Chatroom, ChatroomId, Comment, CommentId, ListFilter, Message, MessageId, Notification,
    NotificationId, Post, PostId, Reaction, ReactionId, User, UserId,
};
