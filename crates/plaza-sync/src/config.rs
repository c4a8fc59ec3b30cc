use std::time::Duration;

/// Tunables shared by the reconcilers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size for the recipient picker.
    pub users_page_size: u32,
    pub notifications_page_size: u32,
    /// Quiet period before a typed search query is sent.
    pub search_debounce: Duration,
    /// How long a notice stays visible.
    pub notice_ttl: Duration,
    /// Restore the unread flag when a notification read call fails.
    pub rollback_failed_reads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            users_page_size: 500,
            notifications_page_size: 20,
            search_debounce: Duration::from_millis(300),
            notice_ttl: Duration::from_secs(4),
            rollback_failed_reads: true,
        }
    }
}
