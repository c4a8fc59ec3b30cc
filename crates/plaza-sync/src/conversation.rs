use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use plaza_api::{ApiError, MessagesApi};
use plaza_gateway::{EventBus, Subscription};
use plaza_types::api::SendMessageRequest;
use plaza_types::{Chatroom, ChatroomId, EventKind, ListFilter, Message, PushEvent, Topic, UserId};

use crate::collection::{LiveCollection, load_page};
use crate::cursor::{PageCursor, PageOutcome, PageSkip};
use crate::generation::{ViewGeneration, ViewToken};
use crate::notice::NoticeSink;
use crate::optimistic::{BusyClaim, MutationError};
use crate::session::Session;

/// The chatroom currently shown, newest message first.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenConversation {
    pub chatroom_id: ChatroomId,
    /// The other participant, who receives what is sent here. Unknown only
    /// while neither the list nor the transcript has named them.
    pub counterpart_id: Option<UserId>,
    pub messages: Vec<Message>,
    /// `false` until the first transcript fetch landed.
    pub loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The transcript could not be fetched; the conversation was closed again.
    FetchFailed,
    /// The transcript is shown but the unread count was left as is.
    MarkReadFailed,
    /// Another chatroom was opened (or this one closed) before the fetch finished.
    Superseded,
}

/// Chatroom list, open transcript and unread counters.
///
/// The list is kept sorted by last activity, newest first. It listens on the
/// user's private `chatrooms.{id}` topic at all times and on `chatroom.{id}`
/// only while that chatroom is open.
#[derive(Clone)]
pub struct ConversationReconciler {
    inner: Arc<ConversationInner>,
}

struct ConversationInner {
    session: Arc<Session>,
    api: Arc<dyn MessagesApi>,
    notices: NoticeSink,
    state: Mutex<ConversationState>,
    view: ViewGeneration,
    sending: AtomicBool,
    bus: Mutex<Option<EventBus>>,
    user_subs: Mutex<Vec<Subscription>>,
    room_subs: Mutex<Vec<Subscription>>,
    unread_tx: watch::Sender<u32>,
}

struct ConversationState {
    chatrooms: LiveCollection<Chatroom>,
    filter: ListFilter,
    open: Option<OpenConversation>,
}

impl ConversationState {
    fn chatrooms(&mut self) -> &mut LiveCollection<Chatroom> {
        &mut self.chatrooms
    }

    fn open_mut(&mut self, chatroom_id: ChatroomId) -> Option<&mut OpenConversation> {
        self.open.as_mut().filter(|o| o.chatroom_id == chatroom_id)
    }

    fn unread_total(&self) -> u32 {
        self.chatrooms.items().iter().map(|c| c.unread_count).sum()
    }
}

/// Rooms without any timestamp are new to this client; give them one so they
/// sort to the head instead of the tail.
fn stamped(mut chatroom: Chatroom) -> Chatroom {
    if chatroom.last_activity().is_none() {
        chatroom.updated_at = Some(Utc::now());
    }
    chatroom
}

fn by_last_activity(a: &Chatroom, b: &Chatroom) -> Ordering {
    b.last_activity().cmp(&a.last_activity())
}

impl ConversationReconciler {
    pub fn new(session: Arc<Session>, api: Arc<dyn MessagesApi>, notices: NoticeSink) -> Self {
        let (unread_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(ConversationInner {
                session,
                api,
                notices,
                state: Mutex::new(ConversationState {
                    chatrooms: LiveCollection::ordered_by(by_last_activity),
                    filter: ListFilter::All,
                    open: None,
                }),
                view: ViewGeneration::default(),
                sending: AtomicBool::new(false),
                bus: Mutex::new(None),
                user_subs: Mutex::new(Vec::new()),
                room_subs: Mutex::new(Vec::new()),
                unread_tx,
            }),
        }
    }

    pub fn attach(&self, bus: &EventBus) {
        let topic = Topic::user_chatrooms(self.inner.session.user_id());
        let subs = [EventKind::ChatroomCreated, EventKind::MessageSent, EventKind::MessageRead]
            .into_iter()
            .map(|kind| bus.subscribe(topic.clone(), kind, self.inner.handler()))
            .collect::<Vec<_>>();

        *self.inner.bus.lock() = Some(bus.clone());
        *self.inner.user_subs.lock() = subs;
        debug!("Conversations attached to {}", topic);
    }

    pub fn detach(&self) {
        let inner = &self.inner;
        inner.close_open();
        drop(std::mem::take(&mut *inner.user_subs.lock()));
        inner.bus.lock().take();
        inner.state.lock().chatrooms.reset_cursor();
    }

    pub fn apply_event(&self, event: &PushEvent) {
        self.inner.apply_event(event);
    }

    // -- Chatroom list --

    pub async fn load_chatrooms(&self) -> PageOutcome {
        self.request_page(1).await
    }

    pub async fn reload(&self) -> PageOutcome {
        self.inner.state.lock().chatrooms.reset_cursor();
        self.request_page(1).await
    }

    pub async fn load_more(&self) -> Option<PageOutcome> {
        let next = self.inner.state.lock().chatrooms.cursor().next_page()?;
        Some(self.request_page(next).await)
    }

    pub async fn request_page(&self, page: u32) -> PageOutcome {
        let inner = &self.inner;
        let api = inner.api.clone();
        let filter = inner.state.lock().filter;
        let outcome = load_page(
            &inner.state,
            ConversationState::chatrooms,
            page,
            |n| async move { api.fetch_chatrooms(filter, n).await },
            &inner.notices,
            "Failed to fetch chatrooms.",
        )
        .await;
        inner.publish_unread();
        outcome
    }

    /// Switches between all and unread chatrooms and refetches page 1.
    pub async fn set_filter(&self, filter: ListFilter) -> PageOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.filter == filter {
                return PageOutcome::Skipped(PageSkip::Unchanged);
            }
            state.filter = filter;
            state.chatrooms.reset_cursor();
        }
        self.request_page(1).await
    }

    // -- Transcript --

    /// Shows `chatroom_id`: fetches its transcript, then marks it read and
    /// clears its unread count. A failed fetch closes it again without
    /// touching the read state.
    pub async fn open(&self, chatroom_id: ChatroomId) -> OpenOutcome {
        let inner = &self.inner;
        let token = inner.view.advance();
        {
            let mut state = inner.state.lock();
            let counterpart_id = state
                .chatrooms
                .get(chatroom_id)
                .map(|room| room.counterpart_id(inner.session.user_id()));
            state.open = Some(OpenConversation {
                chatroom_id,
                counterpart_id,
                messages: Vec::new(),
                loaded: false,
            });
        }
        inner.join_room(chatroom_id);

        if let Err(e) = inner.sync_transcript(chatroom_id, token).await {
            if !inner.view.is_current(token) {
                return OpenOutcome::Superseded;
            }
            inner.notices.error(e.user_message("Failed to open chatroom."));
            inner.close_open();
            return OpenOutcome::FetchFailed;
        }
        if !inner.view.is_current(token) {
            return OpenOutcome::Superseded;
        }

        match inner.api.mark_read(chatroom_id).await {
            Ok(()) => {
                inner.state.lock().chatrooms.patch(chatroom_id, |c| c.unread_count = 0);
                inner.publish_unread();
                if inner.view.is_current(token) {
                    OpenOutcome::Opened
                } else {
                    OpenOutcome::Superseded
                }
            }
            Err(e) => {
                inner.notices.error(e.user_message("Failed to mark messages as read."));
                OpenOutcome::MarkReadFailed
            }
        }
    }

    /// Refetches the transcript of the open chatroom, if any.
    pub async fn refresh_open(&self) -> Option<OpenOutcome> {
        let chatroom_id = self.inner.state.lock().open.as_ref()?.chatroom_id;
        let token = self.inner.view.current();
        let outcome = match self.inner.sync_transcript(chatroom_id, token).await {
            Ok(()) if self.inner.view.is_current(token) => OpenOutcome::Opened,
            Ok(()) => OpenOutcome::Superseded,
            Err(e) => {
                warn!("Refreshing chatroom {} failed: {}", chatroom_id, e);
                OpenOutcome::FetchFailed
            }
        };
        Some(outcome)
    }

    pub fn close(&self) {
        self.inner.close_open();
    }

    /// Sends `body` to the open chatroom. The message is shown immediately as
    /// pending and replaced by the server's copy once confirmed.
    pub async fn send(&self, body: &str) -> Result<Message, MutationError> {
        let inner = &self.inner;
        let me = inner.session.user_id();
        let body = body.trim();
        if body.is_empty() {
            return Err(MutationError::Invalid("message is empty"));
        }

        // The open room may have left the list (e.g. under the unread filter).
        let (chatroom_id, receiver_id) = {
            let state = inner.state.lock();
            let open = state.open.as_ref().ok_or(MutationError::Missing)?;
            let receiver_id = open
                .counterpart_id
                .or_else(|| state.chatrooms.get(open.chatroom_id).map(|room| room.counterpart_id(me)))
                .ok_or(MutationError::Missing)?;
            (open.chatroom_id, receiver_id)
        };
        let _claim = BusyClaim::try_claim(&inner.sending).ok_or(MutationError::Busy)?;

        let pending = Message::pending(chatroom_id, me, receiver_id, body.to_string());
        let local_ref = pending.local_ref;
        if let Some(open) = inner.state.lock().open_mut(chatroom_id) {
            open.messages.insert(0, pending);
        }

        let req = SendMessageRequest {
            message_chatroom_id: chatroom_id,
            message_receiver_id: receiver_id,
            message_content: body.to_string(),
        };
        let result = inner.api.send_message(&req).await;

        let mut state = inner.state.lock();
        match result {
            Ok(message) => {
                if let Some(open) = state.open_mut(chatroom_id) {
                    let echoed = open.messages.iter().any(|m| !m.is_pending() && m.id == message.id);
                    let slot = open.messages.iter().position(|m| m.is_pending() && m.local_ref == local_ref);
                    match (slot, echoed) {
                        (Some(i), false) => open.messages[i] = message.clone(),
                        (Some(i), true) => {
                            open.messages.remove(i);
                        }
                        (None, false) => open.messages.insert(0, message.clone()),
                        (None, true) => {}
                    }
                }
                state.chatrooms.patch(chatroom_id, |room| {
                    room.updated_at = Some(message.created_at.unwrap_or_else(Utc::now));
                    room.latest_message = Some(message.clone());
                });
                Ok(message)
            }
            Err(e) => {
                if let Some(open) = state.open_mut(chatroom_id) {
                    open.messages.retain(|m| m.local_ref != local_ref);
                }
                drop(state);
                inner.notices.error(e.user_message("Failed to send message."));
                Err(e.into())
            }
        }
    }

    /// Starts (or resumes) a chat with `receiver_id` and opens it with an empty
    /// transcript.
    pub async fn create_chatroom(&self, receiver_id: UserId) -> Result<Chatroom, MutationError> {
        let inner = &self.inner;
        let me = inner.session.user_id();
        if receiver_id == me {
            return Err(MutationError::Invalid("cannot start a chat with yourself"));
        }
        let _claim = BusyClaim::try_claim(&inner.sending).ok_or(MutationError::Busy)?;

        let chatroom = match inner.api.create_chatroom(receiver_id).await {
            Ok(chatroom) => chatroom,
            Err(e) => {
                inner.notices.error(e.user_message("Failed to create chatroom."));
                return Err(e.into());
            }
        };

        let chatroom = stamped(chatroom);
        inner.view.advance();
        {
            let mut state = inner.state.lock();
            state.chatrooms.insert_front(chatroom.clone());
            state.open = Some(OpenConversation {
                chatroom_id: chatroom.id,
                counterpart_id: Some(chatroom.counterpart_id(me)),
                messages: Vec::new(),
                loaded: true,
            });
        }
        inner.join_room(chatroom.id);
        inner.publish_unread();

        info!("Chatroom {} with user {} ready", chatroom.id, receiver_id);
        inner
            .notices
            .success(format!("Chat started with {}.", chatroom.counterpart_name(me)));
        Ok(chatroom)
    }

    // -- Snapshots --

    pub fn chatrooms(&self) -> Vec<Chatroom> {
        self.inner.state.lock().chatrooms.items().to_vec()
    }

    /// The list as displayed under the current filter.
    pub fn visible_chatrooms(&self) -> Vec<Chatroom> {
        let state = self.inner.state.lock();
        state
            .chatrooms
            .items()
            .iter()
            .filter(|c| state.filter == ListFilter::All || c.unread_count > 0)
            .cloned()
            .collect()
    }

    pub fn chatroom(&self, chatroom_id: ChatroomId) -> Option<Chatroom> {
        self.inner.state.lock().chatrooms.get(chatroom_id).cloned()
    }

    pub fn open_conversation(&self) -> Option<OpenConversation> {
        self.inner.state.lock().open.clone()
    }

    pub fn filter(&self) -> ListFilter {
        self.inner.state.lock().filter
    }

    pub fn cursor(&self) -> PageCursor {
        *self.inner.state.lock().chatrooms.cursor()
    }

    pub fn unread_total(&self) -> u32 {
        self.inner.state.lock().unread_total()
    }

    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Badge feed: the summed unread count, updated after every change.
    pub fn watch_unread(&self) -> watch::Receiver<u32> {
        self.inner.unread_tx.subscribe()
    }
}

impl ConversationInner {
    fn handler(self: &Arc<Self>) -> impl Fn(&PushEvent) + Send + Sync + 'static {
        let weak: Weak<Self> = Arc::downgrade(self);
        move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_event(event);
            }
        }
    }

    fn apply_event(&self, event: &PushEvent) {
        {
            let mut state = self.state.lock();
            match event {
                PushEvent::ChatroomCreated { chatroom } => {
                    if !state.chatrooms.insert_front(stamped(chatroom.clone())) {
                        debug!("Chatroom {} already listed", chatroom.id);
                    }
                }
                PushEvent::MessageSent { message } => self.on_message(&mut state, message),
                PushEvent::MessageRead { chatroom_id, receiver_id, .. } => {
                    on_read(&mut state, *chatroom_id, *receiver_id)
                }
                other => {
                    debug!("Conversations ignore {}", other.kind());
                    return;
                }
            }
        }
        self.publish_unread();
    }

    fn on_message(&self, state: &mut ConversationState, message: &Message) {
        let me = self.session.user_id();
        let mut message = message.clone();
        // Undated pushes count as just happened, so the room still moves up.
        message.created_at.get_or_insert_with(Utc::now);
        let message = &message;
        let incoming = message.sender_id != me;

        let is_open = match state.open_mut(message.chatroom_id) {
            Some(open) => {
                if !open.messages.iter().any(|m| !m.is_pending() && m.id == message.id) {
                    let mut shown = message.clone();
                    shown.read |= incoming;
                    open.messages.insert(0, shown);
                }
                true
            }
            None => false,
        };

        let listed = state.chatrooms.patch(message.chatroom_id, |room| {
            let repeat = room.latest_message.as_ref().is_some_and(|m| m.id == message.id);
            room.updated_at = message.created_at.or(room.updated_at);
            room.latest_message = Some(message.clone());
            if incoming && !is_open && !repeat {
                room.unread_count += 1;
            }
        });
        if listed.is_none() {
            debug!("Message {} for unlisted chatroom {}", message.id, message.chatroom_id);
        }
    }

    async fn sync_transcript(&self, chatroom_id: ChatroomId, token: ViewToken) -> Result<(), ApiError> {
        let page = self.api.fetch_transcript(chatroom_id).await?;
        if !self.view.is_current(token) {
            return Ok(());
        }

        let mut state = self.state.lock();
        if let Some(open) = state.open_mut(chatroom_id) {
            let fetched: HashSet<_> = page.records.iter().map(|m| m.id).collect();
            // Pending sends and pushes that raced the fetch stay on top.
            let mut messages: Vec<Message> = open
                .messages
                .drain(..)
                .filter(|m| m.is_pending() || !fetched.contains(&m.id))
                .collect();
            messages.extend(page.records);
            if open.counterpart_id.is_none() {
                let me = self.session.user_id();
                open.counterpart_id = messages
                    .iter()
                    .find(|m| !m.is_pending())
                    .map(|m| if m.sender_id == me { m.receiver_id } else { m.sender_id });
            }
            open.messages = messages;
            open.loaded = true;
        }
        Ok(())
    }

    fn join_room(self: &Arc<Self>, chatroom_id: ChatroomId) {
        let Some(bus) = self.bus.lock().clone() else {
            return;
        };
        let topic = Topic::chatroom(chatroom_id);
        let subs: Vec<Subscription> = [EventKind::MessageSent, EventKind::MessageRead]
            .into_iter()
            .map(|kind| bus.subscribe(topic.clone(), kind, self.handler()))
            .collect();
        // The old subscriptions go after the new ones exist, so reopening the
        // same chatroom does not leave and rejoin its topic.
        let previous = std::mem::replace(&mut *self.room_subs.lock(), subs);
        drop(previous);
    }

    fn close_open(&self) {
        self.view.advance();
        self.state.lock().open = None;
        drop(std::mem::take(&mut *self.room_subs.lock()));
    }

    fn publish_unread(&self) {
        let total = self.state.lock().unread_total();
        self.unread_tx.send_if_modified(|current| {
            if *current == total {
                false
            } else {
                *current = total;
                true
            }
        });
    }
}

fn on_read(state: &mut ConversationState, chatroom_id: Option<ChatroomId>, receiver_id: UserId) {
    if let Some(open) = state
        .open
        .as_mut()
        .filter(|o| chatroom_id.is_none_or(|id| id == o.chatroom_id))
    {
        open.messages
            .iter_mut()
            .filter(|m| m.sender_id == receiver_id)
            .for_each(|m| m.read = true);
    }
    if let Some(id) = chatroom_id {
        state.chatrooms.patch(id, |room| {
            if let Some(latest) = room.latest_message.as_mut().filter(|m| m.sender_id == receiver_id) {
                latest.read = true;
            }
        });
    }
}
