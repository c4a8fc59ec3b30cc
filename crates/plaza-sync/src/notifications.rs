use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use plaza_api::NotificationsApi;
use plaza_gateway::{EventBus, Subscription};
use plaza_types::{EventKind, ListFilter, Notification, NotificationId, PushEvent, Topic};

use crate::collection::{LiveCollection, load_page};
use crate::config::SyncConfig;
use crate::cursor::{PageCursor, PageOutcome, PageSkip};
use crate::notice::NoticeSink;
use crate::optimistic::{BusyClaim, MutationError, Optimistic};
use crate::session::Session;

/// The notification drawer: paged list, read flags and the unread badge.
#[derive(Clone)]
pub struct NotificationReconciler {
    inner: Arc<NotificationInner>,
}

struct NotificationInner {
    session: Arc<Session>,
    api: Arc<dyn NotificationsApi>,
    notices: NoticeSink,
    page_size: u32,
    rollback_failed_reads: bool,
    state: Mutex<NotificationState>,
    reads: Optimistic<NotificationId>,
    marking_all: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
    unread_tx: watch::Sender<u32>,
}

struct NotificationState {
    notifications: LiveCollection<Notification>,
    filter: ListFilter,
}

impl NotificationState {
    fn notifications(&mut self) -> &mut LiveCollection<Notification> {
        &mut self.notifications
    }

    fn unread_count(&self) -> u32 {
        let unread = self.notifications.items().iter().filter(|n| !n.read).count();
        u32::try_from(unread).unwrap_or(u32::MAX)
    }
}

impl NotificationReconciler {
    pub fn new(session: Arc<Session>, api: Arc<dyn NotificationsApi>, notices: NoticeSink, config: &SyncConfig) -> Self {
        let (unread_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(NotificationInner {
                session,
                api,
                notices,
                page_size: config.notifications_page_size,
                rollback_failed_reads: config.rollback_failed_reads,
                state: Mutex::new(NotificationState {
                    notifications: LiveCollection::new(),
                    filter: ListFilter::All,
                }),
                reads: Optimistic::default(),
                marking_all: AtomicBool::new(false),
                subscription: Mutex::new(None),
                unread_tx,
            }),
        }
    }

    pub fn attach(&self, bus: &EventBus) {
        let weak: Weak<NotificationInner> = Arc::downgrade(&self.inner);
        let topic = Topic::notifications(self.inner.session.user_id());
        let sub = bus.subscribe(topic, EventKind::NotificationCreated, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_event(event);
            }
        });
        *self.inner.subscription.lock() = Some(sub);
    }

    pub fn detach(&self) {
        self.inner.subscription.lock().take();
        self.inner.state.lock().notifications.reset_cursor();
    }

    pub fn apply_event(&self, event: &PushEvent) {
        self.inner.apply_event(event);
    }

    pub async fn refresh(&self) -> PageOutcome {
        self.request_page(1).await
    }

    pub async fn reload(&self) -> PageOutcome {
        self.inner.state.lock().notifications.reset_cursor();
        self.request_page(1).await
    }

    pub async fn load_more(&self) -> Option<PageOutcome> {
        let next = self.inner.state.lock().notifications.cursor().next_page()?;
        Some(self.request_page(next).await)
    }

    pub async fn request_page(&self, page: u32) -> PageOutcome {
        let inner = &self.inner;
        let api = inner.api.clone();
        let filter = inner.state.lock().filter;
        let page_size = inner.page_size;
        let outcome = load_page(
            &inner.state,
            NotificationState::notifications,
            page,
            |n| async move { api.fetch_notifications(filter, n, page_size).await },
            &inner.notices,
            "Failed to fetch notifications.",
        )
        .await;
        inner.publish_unread();
        outcome
    }

    /// No-op when `filter` is already active.
    pub async fn set_filter(&self, filter: ListFilter) -> PageOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.filter == filter {
                return PageOutcome::Skipped(PageSkip::Unchanged);
            }
            state.filter = filter;
            state.notifications.reset_cursor();
        }
        self.request_page(1).await
    }

    /// Flips one notification to read right away. If the server call fails the
    /// flag is restored, unless rollback of failed reads is disabled.
    pub async fn mark_read(&self, id: NotificationId) -> Result<(), MutationError> {
        let inner = &self.inner;
        let already_read = inner
            .state
            .lock()
            .notifications
            .get(id)
            .map(|n| n.read)
            .ok_or(MutationError::Missing)?;
        if already_read {
            return Ok(());
        }

        let result = inner
            .reads
            .run(
                id,
                || {
                    inner
                        .state
                        .lock()
                        .notifications
                        .patch(id, |n| n.read = true)
                        .ok_or(MutationError::Missing)
                },
                inner.api.mark_read(id),
                |_| {},
                |()| {
                    if inner.rollback_failed_reads {
                        inner.state.lock().notifications.patch(id, |n| n.read = false);
                    }
                },
            )
            .await;

        inner.publish_unread();
        if let Err(MutationError::Api(e)) = &result {
            inner.notices.error(e.user_message("Failed to mark notification as read."));
        }
        result
    }

    pub async fn mark_all_read(&self) -> Result<(), MutationError> {
        let inner = &self.inner;
        let _claim = BusyClaim::try_claim(&inner.marking_all).ok_or(MutationError::Busy)?;

        let flipped: Vec<NotificationId> = {
            let mut state = inner.state.lock();
            let ids: Vec<_> = state
                .notifications
                .items()
                .iter()
                .filter(|n| !n.read)
                .map(|n| n.id)
                .collect();
            state.notifications.patch_all(|n| n.read = true);
            ids
        };
        inner.publish_unread();

        if let Err(e) = inner.api.mark_all_read().await {
            if inner.rollback_failed_reads {
                let mut state = inner.state.lock();
                for id in &flipped {
                    state.notifications.patch(*id, |n| n.read = false);
                }
            }
            inner.publish_unread();
            inner.notices.error(e.user_message("Failed to mark all notifications as read."));
            return Err(e.into());
        }
        debug!("Marked {} notifications read", flipped.len());
        Ok(())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state.lock().notifications.items().to_vec()
    }

    /// The list as displayed under the current filter.
    pub fn visible(&self) -> Vec<Notification> {
        let state = self.inner.state.lock();
        state
            .notifications
            .items()
            .iter()
            .filter(|n| state.filter == ListFilter::All || !n.read)
            .cloned()
            .collect()
    }

    pub fn filter(&self) -> ListFilter {
        self.inner.state.lock().filter
    }

    pub fn cursor(&self) -> PageCursor {
        *self.inner.state.lock().notifications.cursor()
    }

    pub fn unread_count(&self) -> u32 {
        self.inner.state.lock().unread_count()
    }

    /// `true` when no loaded notification is unread, including when none are loaded.
    pub fn all_read(&self) -> bool {
        self.unread_count() == 0
    }

    pub fn watch_unread(&self) -> watch::Receiver<u32> {
        self.inner.unread_tx.subscribe()
    }
}

impl NotificationInner {
    fn apply_event(&self, event: &PushEvent) {
        let PushEvent::NotificationCreated { notification } = event else {
            debug!("Notifications ignore {}", event.kind());
            return;
        };
        let added = self.state.lock().notifications.insert_front(notification.clone());
        if added {
            self.publish_unread();
        }
    }

    fn publish_unread(&self) {
        let total = self.state.lock().unread_count();
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
