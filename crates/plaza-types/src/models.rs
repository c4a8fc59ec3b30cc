use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::wire;

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    wire::id(deserializer).map($name)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

id_type!(
    UserId,
    PostId,
    CommentId,
    ReactionId,
    ChatroomId,
    MessageId,
    NotificationId,
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(rename = "user_fname", default)]
    pub first_name: String,
    #[serde(rename = "user_lname", default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.username.clone().unwrap_or_else(|| "User".into())
    }
}

/// A feed post as the feed renders it.
///
/// `liked_by_user` and `user_reaction_id` describe the viewing user's own like.
/// Once settled they agree: the reaction id is present exactly while the like
/// exists, since it is what an unlike has to send back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(rename = "user", default)]
    pub author: Option<User>,
    #[serde(rename = "post_content", default)]
    pub body: String,
    #[serde(rename = "likesCount", alias = "likeCount", default, deserialize_with = "wire::count")]
    pub like_count: u32,
    #[serde(rename = "commentsCount", alias = "commentCount", default, deserialize_with = "wire::count")]
    pub comment_count: u32,
    #[serde(rename = "shareCount", alias = "sharesCount", default, deserialize_with = "wire::count")]
    pub share_count: u32,
    #[serde(rename = "likedByUser", default, deserialize_with = "wire::flag")]
    pub liked_by_user: bool,
    #[serde(default)]
    pub user_reaction_id: Option<ReactionId>,
    #[serde(rename = "post_is_shared", default, deserialize_with = "wire::flag")]
    pub is_shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_post: Option<Box<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Shared posts embed their original one level deep; anything below that is dropped.
    pub fn normalized(mut self) -> Self {
        if let Some(original) = self.original_post.as_mut() {
            original.original_post = None;
            original.comments = None;
        }
        if self.original_post.is_none() {
            self.is_shared = false;
        }
        self
    }

    pub fn is_liked(&self) -> bool {
        self.liked_by_user
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(rename = "comment_post_id", alias = "post_id")]
    pub post_id: PostId,
    #[serde(rename = "user", default)]
    pub author: Option<User>,
    #[serde(rename = "comment_content", default)]
    pub body: String,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    #[serde(rename = "reaction_post_id", alias = "post_id", default)]
    pub post_id: Option<PostId>,
    #[serde(rename = "reaction_user_id", alias = "user_id", default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "message_chatroom_id")]
    pub chatroom_id: ChatroomId,
    #[serde(rename = "message_sender_id")]
    pub sender_id: UserId,
    #[serde(rename = "message_receiver_id")]
    pub receiver_id: UserId,
    #[serde(rename = "message_content", default)]
    pub body: String,
    #[serde(rename = "message_read", default, deserialize_with = "wire::flag")]
    pub read: bool,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set only on a locally inserted message that the server has not confirmed yet.
    #[serde(skip)]
    pub local_ref: Option<Uuid>,
}

impl Message {
    /// Builds an unconfirmed message for immediate display in the open transcript.
    pub fn pending(chatroom_id: ChatroomId, sender_id: UserId, receiver_id: UserId, body: String) -> Self {
        Self {
            id: MessageId(0),
            chatroom_id,
            sender_id,
            receiver_id,
            body,
            read: false,
            created_at: Some(Utc::now()),
            local_ref: Some(Uuid::new_v4()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.local_ref.is_some()
    }
}

/// A two-party conversation as listed in the chatroom drawer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChatroomRepr")]
pub struct Chatroom {
    pub id: ChatroomId,
    #[serde(rename = "cr_user_one_id")]
    pub user_one_id: UserId,
    #[serde(rename = "cr_user_two_id")]
    pub user_two_id: UserId,
    pub user_one: Option<User>,
    pub user_two: Option<User>,
    pub latest_message: Option<Message>,
    pub unread_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chatroom {
    pub fn includes(&self, user: UserId) -> bool {
        self.user_one_id == user || self.user_two_id == user
    }

    /// The participant that is not `me`.
    pub fn counterpart_id(&self, me: UserId) -> UserId {
        if self.user_one_id == me {
            self.user_two_id
        } else {
            self.user_one_id
        }
    }

    pub fn counterpart(&self, me: UserId) -> Option<&User> {
        if self.user_one_id == me {
            self.user_two.as_ref()
        } else {
            self.user_one.as_ref()
        }
    }

    pub fn counterpart_name(&self, me: UserId) -> String {
        self.counterpart(me)
            .map(User::display_name)
            .unwrap_or_else(|| "User".into())
    }

    /// Timestamp used to order the chatroom list: latest message, else last update.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.latest_message
            .as_ref()
            .and_then(|m| m.created_at)
            .or(self.updated_at)
    }
}

#[derive(Deserialize)]
struct ChatroomRepr {
    #[serde(deserialize_with = "wire::id")]
    id: u64,
    #[serde(default)]
    cr_user_one_id: Option<UserId>,
    #[serde(default)]
    cr_user_two_id: Option<UserId>,
    #[serde(default, alias = "userOne")]
    user_one: Option<User>,
    #[serde(default, alias = "userTwo")]
    user_two: Option<User>,
    #[serde(default)]
    latest_message: Option<Message>,
    /// Older revisions embed the transcript head, latest first.
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default, deserialize_with = "wire::count")]
    unread_count: u32,
    #[serde(default, deserialize_with = "wire::timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ChatroomRepr> for Chatroom {
    type Error = String;

    fn try_from(repr: ChatroomRepr) -> Result<Self, Self::Error> {
        let user_one_id = repr
            .cr_user_one_id
            .or_else(|| repr.user_one.as_ref().map(|u| u.id))
            .ok_or_else(|| format!("chatroom {} has no first participant", repr.id))?;
        let user_two_id = repr
            .cr_user_two_id
            .or_else(|| repr.user_two.as_ref().map(|u| u.id))
            .ok_or_else(|| format!("chatroom {} has no second participant", repr.id))?;
        let latest_message = repr
            .latest_message
            .or_else(|| repr.messages.and_then(|m| m.into_iter().next()));

        Ok(Chatroom {
            id: ChatroomId(repr.id),
            user_one_id,
            user_two_id,
            user_one: repr.user_one,
            user_two: repr.user_two,
            latest_message,
            unread_count: repr.unread_count,
            updated_at: repr.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "notification_message", alias = "message", default)]
    pub message: String,
    #[serde(rename = "notification_read", alias = "read", default, deserialize_with = "wire::flag")]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Server-side list filter shared by the chatroom and notification drawers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    #[default]
    All,
    Unread,
}

impl ListFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Unread => "unread",
        }
    }
}
