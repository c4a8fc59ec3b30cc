use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use plaza_api::UsersApi;
use plaza_types::User;
use plaza_types::api::UserQuery;

use crate::collection::{LiveCollection, load_page};
use crate::config::SyncConfig;
use crate::cursor::{PageOutcome, PageSkip};
use crate::generation::ViewGeneration;
use crate::notice::NoticeSink;

/// Recipient picker for new chats.
#[derive(Clone)]
pub struct UserDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    api: Arc<dyn UsersApi>,
    notices: NoticeSink,
    page_size: u32,
    debounce: Duration,
    searches: ViewGeneration,
    state: Mutex<DirectoryState>,
}

#[derive(Default)]
struct DirectoryState {
    users: LiveCollection<User>,
    search: Option<String>,
}

impl DirectoryState {
    fn users(&mut self) -> &mut LiveCollection<User> {
        &mut self.users
    }
}

impl UserDirectory {
    pub fn new(api: Arc<dyn UsersApi>, notices: NoticeSink, config: &SyncConfig) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                api,
                notices,
                page_size: config.users_page_size,
                debounce: config.search_debounce,
                searches: ViewGeneration::default(),
                state: Mutex::new(DirectoryState::default()),
            }),
        }
    }

    /// Replaces the listing with the first page matching `query`. A blank
    /// query lists everyone.
    pub async fn search(&self, query: &str) -> PageOutcome {
        {
            let mut state = self.inner.state.lock();
            let query = query.trim();
            state.search = (!query.is_empty()).then(|| query.to_string());
            state.users.reset_cursor();
        }
        self.request_page(1).await
    }

    /// Like [`search`](Self::search), but waits for the input to settle first.
    /// Only the last of a burst of calls reaches the server.
    pub async fn search_debounced(&self, query: &str) -> PageOutcome {
        let token = self.inner.searches.advance();
        tokio::time::sleep(self.inner.debounce).await;
        if !self.inner.searches.is_current(token) {
            trace!("Search '{}' superseded", query);
            return PageOutcome::Skipped(PageSkip::Superseded);
        }
        self.search(query).await
    }

    pub async fn load_more(&self) -> Option<PageOutcome> {
        let next = self.inner.state.lock().users.cursor().next_page()?;
        Some(self.request_page(next).await)
    }

    pub async fn request_page(&self, page: u32) -> PageOutcome {
        let inner = &self.inner;
        let api = inner.api.clone();
        let query = UserQuery {
            page_index: page,
            page_size: inner.page_size,
            search: inner.state.lock().search.clone(),
        };
        load_page(
            &inner.state,
            DirectoryState::users,
            page,
            |_| async move { api.fetch_users(&query).await },
            &inner.notices,
            "Failed to fetch users.",
        )
        .await
    }

    pub fn users(&self) -> Vec<User> {
        self.inner.state.lock().users.items().to_vec()
    }

    pub fn search_term(&self) -> Option<String> {
        self.inner.state.lock().search.clone()
    }
}
