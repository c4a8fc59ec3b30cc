use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::models::{Chatroom, ChatroomId, Comment, Message, Notification, PostId, UserId};

/// A named push channel. Private channels are authorised with the session's
/// bearer token and carry a `private-` prefix on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
    private: bool,
}

impl Topic {
    pub fn public(name: impl Into<String>) -> Self {
        Self { name: name.into(), private: false }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self { name: name.into(), private: true }
    }

    /// Chatroom lifecycle and message events addressed to one user.
    pub fn user_chatrooms(user: UserId) -> Self {
        Self::private(format!("chatrooms.{}", user))
    }

    /// Message events for one open chatroom.
    pub fn chatroom(chatroom: ChatroomId) -> Self {
        Self::private(format!("chatroom.{}", chatroom))
    }

    pub fn notifications(user: UserId) -> Self {
        Self::private(format!("notifications.{}", user))
    }

    pub fn reactions() -> Self {
        Self::public("reactions")
    }

    pub fn comments() -> Self {
        Self::public("comments")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn wire_name(&self) -> String {
        if self.private {
            format!("private-{}", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn from_wire(wire: &str) -> Self {
        match wire.strip_prefix("private-") {
            Some(name) => Self::private(name),
            None => Self::public(wire),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatroomCreated,
    MessageSent,
    MessageRead,
    ReactionCreated,
    ReactionRemoved,
    CommentCreated,
    NotificationCreated,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::ChatroomCreated,
        EventKind::MessageSent,
        EventKind::MessageRead,
        EventKind::ReactionCreated,
        EventKind::ReactionRemoved,
        EventKind::CommentCreated,
        EventKind::NotificationCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatroomCreated => "chatroom.created",
            Self::MessageSent => "message.sent",
            Self::MessageRead => "message.read",
            Self::ReactionCreated => "reaction.created",
            Self::ReactionRemoved => "reaction.removed",
            Self::CommentCreated => "comment.created",
            Self::NotificationCreated => "notification.created",
        }
    }

    /// Accepts relay-namespaced names such as `.message.sent`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('.');
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events delivered over the push relay.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    ChatroomCreated { chatroom: Chatroom },

    MessageSent { message: Message },

    /// `receiver_id` is the party being told that the messages they sent were read.
    MessageRead {
        chatroom_id: Option<ChatroomId>,
        sender_id: Option<UserId>,
        receiver_id: UserId,
    },

    /// Carries the server's authoritative like count for the post.
    ReactionCreated { post_id: PostId, like_count: u32 },

    ReactionRemoved { post_id: PostId, like_count: u32 },

    CommentCreated {
        comment: Comment,
        comment_count: Option<u32>,
    },

    NotificationCreated { notification: Notification },
}

impl PushEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatroomCreated { .. } => EventKind::ChatroomCreated,
            Self::MessageSent { .. } => EventKind::MessageSent,
            Self::MessageRead { .. } => EventKind::MessageRead,
            Self::ReactionCreated { .. } => EventKind::ReactionCreated,
            Self::ReactionRemoved { .. } => EventKind::ReactionRemoved,
            Self::CommentCreated { .. } => EventKind::CommentCreated,
            Self::NotificationCreated { .. } => EventKind::NotificationCreated,
        }
    }

    /// Decodes a relay payload for a known event kind.
    pub fn decode(kind: EventKind, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::ChatroomCreated => {
                let payload: ChatroomPayload = serde_json::from_value(data)?;
                Self::ChatroomCreated { chatroom: payload.chatroom }
            }
            EventKind::MessageSent => {
                let message = match serde_json::from_value::<MessagePayload>(data)? {
                    MessagePayload::Nested { message } => message,
                    MessagePayload::Flat(message) => message,
                };
                Self::MessageSent { message }
            }
            EventKind::MessageRead => {
                let payload: ReadPayload = serde_json::from_value(data)?;
                Self::MessageRead {
                    chatroom_id: payload.chatroom_id,
                    sender_id: payload.sender_id,
                    receiver_id: payload.receiver_id,
                }
            }
            EventKind::ReactionCreated | EventKind::ReactionRemoved => {
                let payload = match serde_json::from_value::<ReactionPayload>(data)? {
                    ReactionPayload::Nested { reaction } => reaction,
                    ReactionPayload::Flat(body) => body,
                };
                if kind == EventKind::ReactionCreated {
                    Self::ReactionCreated { post_id: payload.post_id, like_count: payload.like_count }
                } else {
                    Self::ReactionRemoved { post_id: payload.post_id, like_count: payload.like_count }
                }
            }
            EventKind::CommentCreated => {
                let payload: CommentPayload = serde_json::from_value(data)?;
                Self::CommentCreated {
                    comment: payload.comment,
                    comment_count: payload.comment_count,
                }
            }
            EventKind::NotificationCreated => {
                let payload: NotificationPayload = serde_json::from_value(data)?;
                Self::NotificationCreated { notification: payload.notification }
            }
        })
    }
}

#[derive(Deserialize)]
struct ChatroomPayload {
    chatroom: Chatroom,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessagePayload {
    Nested { message: Message },
    Flat(Message),
}

#[derive(Deserialize)]
struct ReadPayload {
    #[serde(default, alias = "message_chatroom_id")]
    chatroom_id: Option<ChatroomId>,
    #[serde(default)]
    sender_id: Option<UserId>,
    receiver_id: UserId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReactionPayload {
    Nested { reaction: ReactionBody },
    Flat(ReactionBody),
}

#[derive(Deserialize)]
struct ReactionBody {
    #[serde(alias = "reaction_post_id")]
    post_id: PostId,
    #[serde(rename = "likesCount", alias = "likeCount")]
    like_count: u32,
}

#[derive(Deserialize)]
struct CommentPayload {
    comment: Comment,
    #[serde(rename = "commentCount", alias = "commentsCount", default)]
    comment_count: Option<u32>,
}

#[derive(Deserialize)]
struct NotificationPayload {
    notification: Notification,
}
