use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use plaza_api::{FeedApi, MessagesApi, NotificationsApi, RestClient, UsersApi};
use plaza_gateway::EventBus;

use crate::config::SyncConfig;
use crate::conversation::ConversationReconciler;
use crate::cursor::PageOutcome;
use crate::feed::FeedReconciler;
use crate::notice::NoticeSink;
use crate::notifications::NotificationReconciler;
use crate::session::Session;
use crate::users::UserDirectory;

/// The REST surfaces the reconcilers talk to.
#[derive(Clone)]
pub struct Backends {
    pub feed: Arc<dyn FeedApi>,
    pub messages: Arc<dyn MessagesApi>,
    pub notifications: Arc<dyn NotificationsApi>,
    pub users: Arc<dyn UsersApi>,
}

impl Backends {
    pub fn rest(client: RestClient) -> Self {
        let client = Arc::new(client);
        Self {
            feed: client.clone(),
            messages: client.clone(),
            notifications: client.clone(),
            users: client,
        }
    }
}

/// Owns every reconciler of one signed-in session and wires them to the bus.
#[derive(Clone)]
pub struct SyncEngine {
    pub session: Arc<Session>,
    pub bus: EventBus,
    pub feed: FeedReconciler,
    pub conversations: ConversationReconciler,
    pub notifications: NotificationReconciler,
    pub users: UserDirectory,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Page outcomes of an initial load or resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub feed: PageOutcome,
    pub chatrooms: PageOutcome,
    pub notifications: PageOutcome,
}

impl SyncEngine {
    pub fn new(session: Session, bus: EventBus, backends: Backends, notices: NoticeSink, config: &SyncConfig) -> Self {
        let session = Arc::new(session);
        Self {
            feed: FeedReconciler::new(backends.feed, notices.clone()),
            conversations: ConversationReconciler::new(session.clone(), backends.messages, notices.clone()),
            notifications: NotificationReconciler::new(session.clone(), backends.notifications, notices.clone(), config),
            users: UserDirectory::new(backends.users, notices, config),
            session,
            bus,
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribes every reconciler and loads the first page of each list.
    pub async fn start(&self) -> LoadSummary {
        self.feed.attach(&self.bus);
        self.conversations.attach(&self.bus);
        self.notifications.attach(&self.bus);
        info!("Sync started for user {}", self.session.user_id());

        let (feed, chatrooms, notifications) = tokio::join!(
            self.feed.refresh(),
            self.conversations.load_chatrooms(),
            self.notifications.refresh(),
        );
        LoadSummary { feed, chatrooms, notifications }
    }

    /// Refetches everything that may have changed while push events were not
    /// arriving.
    pub async fn resync(&self) -> LoadSummary {
        info!("Resyncing after reconnect");
        let (feed, chatrooms, notifications, _) = tokio::join!(
            self.feed.reload(),
            self.conversations.reload(),
            self.notifications.reload(),
            self.conversations.refresh_open(),
        );
        LoadSummary { feed, chatrooms, notifications }
    }

    /// Resyncs on every reconnect signal from the bus until shut down.
    pub fn spawn_reconnect_watcher(&self) {
        let engine = self.clone();
        let mut reconnects = self.bus.reconnects();
        let handle = tokio::spawn(async move {
            loop {
                match reconnects.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(n)) => warn!("Missed {} reconnect signals", n),
                    Err(RecvError::Closed) => break,
                }
                engine.resync().await;
            }
        });
        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Releases all subscriptions. In-flight requests finish but their results
    /// are dropped.
    pub fn shutdown(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
        self.feed.detach();
        self.conversations.detach();
        self.notifications.detach();
        info!("Sync stopped");
    }
}
