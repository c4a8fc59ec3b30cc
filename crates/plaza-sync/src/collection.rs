use std::cmp::Ordering;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, warn};

use plaza_api::ApiError;
use plaza_types::{Chatroom, ChatroomId, Notification, NotificationId, Page, Post, PostId, User, UserId};

use crate::cursor::{PageCursor, PageOutcome, PageSkip, PageTicket};
use crate::notice::NoticeSink;

/// Something with a server-assigned identity that lists are merged by.
pub trait Record: Clone + Send + 'static {
    type Key: Copy + Eq + Hash + std::fmt::Debug + Send;

    fn key(&self) -> Self::Key;
}

macro_rules! record {
    ($($ty:ty => $key:ty),* $(,)?) => {
        $(
            impl Record for $ty {
                type Key = $key;

                fn key(&self) -> $key {
                    self.id
                }
            }
        )*
    };
}

record!(
    Post => PostId,
    Chatroom => ChatroomId,
    Notification => NotificationId,
    User => UserId,
);

pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// An ordered, id-unique list backed by a [`PageCursor`].
///
/// Page 1 replaces the contents; later pages are merged, replacing records
/// whose id is already present. With a comparator set, the list is re-sorted
/// (stably) after every change.
#[derive(Debug, Clone)]
pub struct LiveCollection<T: Record> {
    items: Vec<T>,
    cursor: PageCursor,
    order: Option<Comparator<T>>,
}

impl<T: Record> Default for LiveCollection<T> {
    fn default() -> Self {
        Self { items: Vec::new(), cursor: PageCursor::default(), order: None }
    }
}

impl<T: Record> LiveCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ordered_by(order: Comparator<T>) -> Self {
        Self { order: Some(order), ..Self::default() }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: T::Key) -> Option<&T> {
        self.items.iter().find(|r| r.key() == key)
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.get(key).is_some()
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn begin_page(&mut self, page: u32) -> Result<PageTicket, PageSkip> {
        self.cursor.begin(page)
    }

    /// Applies a fetched page. Returns `false` (and leaves the list alone) when
    /// the ticket is stale.
    pub fn finish_page(&mut self, ticket: PageTicket, page: Page<T>) -> bool {
        if !self.cursor.finish(ticket, page.meta) {
            return false;
        }
        if ticket.replaces() {
            self.items.clear();
        }
        for record in page.records {
            self.merge(record);
        }
        self.resort();
        true
    }

    pub fn fail_page(&mut self, ticket: PageTicket) -> bool {
        self.cursor.fail(ticket)
    }

    pub fn reset_cursor(&mut self) {
        self.cursor.reset();
    }

    /// Mutates the record with `key` in place. `None` if it is not in the list.
    pub fn patch<R>(&mut self, key: T::Key, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let record = self.items.iter_mut().find(|r| r.key() == key)?;
        let out = f(record);
        self.resort();
        Some(out)
    }

    pub fn patch_all(&mut self, mut f: impl FnMut(&mut T)) {
        self.items.iter_mut().for_each(&mut f);
        self.resort();
    }

    /// Puts `record` at the head unless its id is already listed.
    pub fn insert_front(&mut self, record: T) -> bool {
        if self.contains(record.key()) {
            return false;
        }
        self.items.insert(0, record);
        self.resort();
        true
    }

    pub fn remove(&mut self, key: T::Key) -> Option<T> {
        let pos = self.items.iter().position(|r| r.key() == key)?;
        Some(self.items.remove(pos))
    }

    fn merge(&mut self, record: T) {
        match self.items.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => *existing = record,
            None => self.items.push(record),
        }
    }

    fn resort(&mut self) {
        if let Some(order) = self.order {
            self.items.sort_by(order);
        }
    }
}

/// Runs one guarded page fetch for the collection selected by `project`.
///
/// The state lock is taken only around the cursor bookkeeping, never across the
/// request itself.
pub(crate) async fn load_page<S, T, F, Fut>(
    state: &Mutex<S>,
    project: fn(&mut S) -> &mut LiveCollection<T>,
    page: u32,
    fetch: F,
    notices: &NoticeSink,
    failure: &str,
) -> PageOutcome
where
    T: Record,
    F: FnOnce(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let ticket = {
        let mut guard = state.lock();
        match project(&mut *guard).begin_page(page) {
            Ok(ticket) => ticket,
            Err(skip) => {
                debug!("Page {} skipped: {:?}", page, skip);
                return PageOutcome::Skipped(skip);
            }
        }
    };

    match fetch(page).await {
        Ok(fetched) => {
            let records = fetched.records.len();
            let mut guard = state.lock();
            if project(&mut *guard).finish_page(ticket, fetched) {
                PageOutcome::Loaded { page, records }
            } else {
                debug!("Dropping stale page {}", page);
                PageOutcome::Stale
            }
        }
        Err(e) => {
            let current = {
                let mut guard = state.lock();
                project(&mut *guard).fail_page(ticket)
            };
            if !current {
                return PageOutcome::Stale;
            }
            warn!("Page {} failed: {}", page, e);
            notices.error(e.user_message(failure));
            PageOutcome::Failed
        }
    }
}
