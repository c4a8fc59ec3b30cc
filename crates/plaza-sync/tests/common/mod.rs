#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use plaza_api::{ApiError, FeedApi, MessagesApi, NotificationsApi, UsersApi};
use plaza_gateway::{EventBus, MemoryTransport};
use plaza_sync::{Backends, Notice, NoticeSink, Session, SyncConfig, SyncEngine};
use plaza_types::api::{SendMessageRequest, UserQuery};
use plaza_types::{
    Chatroom, ChatroomId, Comment, CommentId, ListFilter, Message, MessageId, Notification, NotificationId, Page,
    PageMeta, Post, PostId, Reaction, ReactionId, User, UserId,
};

pub const ME: UserId = UserId(1);
pub const PEER: UserId = UserId(2);

// -- Fixtures --

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
}

pub fn user(id: u64, first: &str) -> User {
    User {
        id: UserId(id),
        first_name: first.into(),
        last_name: "Tester".into(),
        username: None,
        email: None,
        avatar_url: None,
    }
}

pub fn post(id: u64, likes: u32, reaction: Option<u64>) -> Post {
    Post {
        id: PostId(id),
        author: Some(user(9, "Author")),
        body: format!("post {}", id),
        like_count: likes,
        comment_count: 0,
        share_count: 0,
        liked_by_user: reaction.is_some(),
        user_reaction_id: reaction.map(ReactionId),
        is_shared: false,
        original_post: None,
        comments: None,
        created_at: Some(at(0)),
    }
}

pub fn comment(id: u64, post: u64) -> Comment {
    Comment {
        id: CommentId(id),
        post_id: PostId(post),
        author: Some(user(9, "Author")),
        body: format!("comment {}", id),
        created_at: Some(at(1)),
    }
}

pub fn message(id: u64, chatroom: u64, sender: UserId, minute: u32) -> Message {
    let receiver = if sender == ME { PEER } else { ME };
    Message {
        id: MessageId(id),
        chatroom_id: ChatroomId(chatroom),
        sender_id: sender,
        receiver_id: receiver,
        body: format!("message {}", id),
        read: false,
        created_at: Some(at(minute)),
        local_ref: None,
    }
}

pub fn chatroom(id: u64, peer: u64, unread: u32, minute: u32) -> Chatroom {
    Chatroom {
        id: ChatroomId(id),
        user_one_id: ME,
        user_two_id: UserId(peer),
        user_one: Some(user(ME.0, "Me")),
        user_two: Some(user(peer, "Peer")),
        latest_message: None,
        unread_count: unread,
        updated_at: Some(at(minute)),
    }
}

pub fn notification(id: u64, read: bool) -> Notification {
    Notification {
        id: NotificationId(id),
        message: format!("notification {}", id),
        read,
        href: None,
        created_at: Some(at(0)),
    }
}

pub fn page<T>(records: Vec<T>, page_index: u32, total_pages: u32) -> Page<T> {
    let total_records = records.len() as u64 * u64::from(total_pages);
    Page {
        records,
        meta: PageMeta { page_index, total_pages, total_records },
    }
}

pub fn rejected(msg: &str) -> ApiError {
    ApiError::Rejected(msg.into())
}

// -- Gate --

/// Holds a mocked call until released, so tests can act while it is in flight.
#[derive(Default)]
pub struct Gate {
    closed: AtomicBool,
    waiting: AtomicU64,
    open: Notify,
}

impl Gate {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.open.notify_waiters();
    }

    pub fn waiting(&self) -> u64 {
        self.waiting.load(Ordering::SeqCst)
    }

    async fn pass(&self) {
        if !self.closed.load(Ordering::SeqCst) {
            return;
        }
        let opened = self.open.notified();
        self.waiting.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            opened.await;
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Yields until `cond` holds. Panics if it never does.
pub async fn until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// -- Feed --

#[derive(Default)]
pub struct MockFeed {
    pub pages: Mutex<HashMap<u32, Page<Post>>>,
    pub details: Mutex<HashMap<PostId, Post>>,
    pub comments: Mutex<HashMap<PostId, Vec<Comment>>>,
    pub fail_react: AtomicBool,
    pub fail_unreact: AtomicBool,
    pub fail_create: AtomicBool,
    pub reaction_gate: Gate,
    pub detail_gate: Gate,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockFeed {
    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl FeedApi for MockFeed {
    async fn fetch_posts(&self, page_index: u32) -> Result<Page<Post>, ApiError> {
        self.log(format!("fetch_posts {}", page_index));
        self.pages
            .lock()
            .get(&page_index)
            .cloned()
            .ok_or_else(|| rejected("no such page"))
    }

    async fn fetch_post(&self, post_id: PostId) -> Result<Post, ApiError> {
        self.log(format!("fetch_post {}", post_id));
        self.detail_gate.pass().await;
        self.details
            .lock()
            .get(&post_id)
            .cloned()
            .ok_or_else(|| rejected("Post not found."))
    }

    async fn create_post(&self, body: &str) -> Result<(), ApiError> {
        self.log(format!("create_post {}", body));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(rejected("Post rejected."));
        }
        Ok(())
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), ApiError> {
        self.log(format!("delete_post {}", post_id));
        Ok(())
    }

    async fn share_post(&self, post_id: PostId, caption: &str) -> Result<(), ApiError> {
        self.log(format!("share_post {} {}", post_id, caption));
        Ok(())
    }

    async fn fetch_comments(&self, post_id: PostId, _page_index: u32) -> Result<Page<Comment>, ApiError> {
        self.log(format!("fetch_comments {}", post_id));
        let comments = self.comments.lock().get(&post_id).cloned().unwrap_or_default();
        Ok(Page::single(comments))
    }

    async fn add_comment(&self, post_id: PostId, body: &str) -> Result<(), ApiError> {
        self.log(format!("add_comment {}", post_id));
        let id = 500 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut added = comment(id, post_id.0);
        added.body = body.into();
        self.comments.lock().entry(post_id).or_default().push(added);
        Ok(())
    }

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), ApiError> {
        self.log(format!("delete_comment {}", comment_id));
        Ok(())
    }

    async fn react(&self, post_id: PostId) -> Result<Reaction, ApiError> {
        self.log(format!("react {}", post_id));
        self.reaction_gate.pass().await;
        if self.fail_react.load(Ordering::SeqCst) {
            return Err(rejected("Reaction failed."));
        }
        Ok(Reaction {
            id: ReactionId(100 + self.next_id.fetch_add(1, Ordering::SeqCst)),
            post_id: Some(post_id),
            user_id: Some(ME),
        })
    }

    async fn unreact(&self, reaction_id: ReactionId) -> Result<(), ApiError> {
        self.log(format!("unreact {}", reaction_id));
        self.reaction_gate.pass().await;
        if self.fail_unreact.load(Ordering::SeqCst) {
            return Err(rejected("Unlike failed."));
        }
        Ok(())
    }

    async fn fetch_reactions(&self, _post_id: PostId, _page_index: u32) -> Result<Page<Reaction>, ApiError> {
        Ok(Page::single(Vec::new()))
    }
}

// -- Messages --

#[derive(Default)]
pub struct MockMessages {
    pub pages: Mutex<HashMap<(ListFilter, u32), Page<Chatroom>>>,
    pub transcripts: Mutex<HashMap<ChatroomId, Vec<Message>>>,
    pub fail_transcript: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub fail_send: AtomicBool,
    pub created: Mutex<Option<Chatroom>>,
    pub transcript_gate: Gate,
    pub send_gate: Gate,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockMessages {
    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl MessagesApi for MockMessages {
    async fn fetch_chatrooms(&self, filter: ListFilter, page_index: u32) -> Result<Page<Chatroom>, ApiError> {
        self.log(format!("fetch_chatrooms {} {}", filter.as_str(), page_index));
        self.pages
            .lock()
            .get(&(filter, page_index))
            .cloned()
            .ok_or_else(|| rejected("no such page"))
    }

    async fn fetch_transcript(&self, chatroom_id: ChatroomId) -> Result<Page<Message>, ApiError> {
        self.log(format!("fetch_transcript {}", chatroom_id));
        self.transcript_gate.pass().await;
        if self.fail_transcript.load(Ordering::SeqCst) {
            return Err(rejected("Chatroom unavailable."));
        }
        let messages = self.transcripts.lock().get(&chatroom_id).cloned().unwrap_or_default();
        Ok(Page::single(messages))
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, ApiError> {
        self.log(format!("send_message {}", req.message_chatroom_id));
        self.send_gate.pass().await;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(rejected("Message not sent."));
        }
        let mut sent = message(
            900 + self.next_id.fetch_add(1, Ordering::SeqCst),
            req.message_chatroom_id.0,
            ME,
            30,
        );
        sent.receiver_id = req.message_receiver_id;
        sent.body = req.message_content.clone();
        Ok(sent)
    }

    async fn mark_read(&self, chatroom_id: ChatroomId) -> Result<(), ApiError> {
        self.log(format!("mark_read {}", chatroom_id));
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(rejected("Could not mark as read."));
        }
        Ok(())
    }

    async fn create_chatroom(&self, receiver_id: UserId) -> Result<Chatroom, ApiError> {
        self.log(format!("create_chatroom {}", receiver_id));
        self.created
            .lock()
            .clone()
            .ok_or_else(|| rejected("Could not create chatroom."))
    }
}

// -- Notifications --

#[derive(Default)]
pub struct MockNotifications {
    pub pages: Mutex<HashMap<(ListFilter, u32), Page<Notification>>>,
    pub fail_mark: AtomicBool,
    pub page_sizes: Mutex<Vec<u32>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockNotifications {
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl NotificationsApi for MockNotifications {
    async fn fetch_notifications(
        &self,
        filter: ListFilter,
        page_index: u32,
        page_size: u32,
    ) -> Result<Page<Notification>, ApiError> {
        self.calls.lock().push(format!("fetch {} {}", filter.as_str(), page_index));
        self.page_sizes.lock().push(page_size);
        self.pages
            .lock()
            .get(&(filter, page_index))
            .cloned()
            .ok_or_else(|| rejected("no such page"))
    }

    async fn mark_read(&self, notification_id: NotificationId) -> Result<(), ApiError> {
        self.calls.lock().push(format!("mark_read {}", notification_id));
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(rejected("Could not mark notification."));
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.calls.lock().push("mark_all_read".into());
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(rejected("Could not mark notifications."));
        }
        Ok(())
    }
}

// -- Users --

#[derive(Default)]
pub struct MockUsers {
    pub users: Mutex<Vec<User>>,
    pub queries: Mutex<Vec<UserQuery>>,
}

#[async_trait]
impl UsersApi for MockUsers {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Page<User>, ApiError> {
        self.queries.lock().push(query.clone());
        let term = query.search.clone().unwrap_or_default().to_lowercase();
        let matching = self
            .users
            .lock()
            .iter()
            .filter(|u| u.display_name().to_lowercase().contains(&term))
            .cloned()
            .collect();
        Ok(Page::single(matching))
    }
}

// -- Harness --

pub struct Harness {
    pub engine: SyncEngine,
    pub transport: Arc<MemoryTransport>,
    pub feed: Arc<MockFeed>,
    pub messages: Arc<MockMessages>,
    pub notifications: Arc<MockNotifications>,
    pub users: Arc<MockUsers>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig {
            search_debounce: Duration::from_millis(20),
            ..SyncConfig::default()
        })
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let transport = Arc::new(MemoryTransport::default());
        let bus = EventBus::new(transport.clone());
        let feed = Arc::new(MockFeed::default());
        let messages = Arc::new(MockMessages::default());
        let notifications = Arc::new(MockNotifications::default());
        let users = Arc::new(MockUsers::default());
        let (sink, notices) = NoticeSink::channel(config.notice_ttl);
        let backends = Backends {
            feed: feed.clone(),
            messages: messages.clone(),
            notifications: notifications.clone(),
            users: users.clone(),
        };
        let session = Session::new(ME).with_user(user(ME.0, "Me"));
        Self {
            engine: SyncEngine::new(session, bus, backends, sink, &config),
            transport,
            feed,
            messages,
            notifications,
            users,
            notices,
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}
