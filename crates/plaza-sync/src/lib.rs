//! Client-side reconciliation of the social feed, chatrooms and notifications.
//!
//! Each reconciler owns one view's collection, fills it from paged REST fetches,
//! patches it from push events delivered by the [`plaza_gateway::EventBus`] and
//! applies local changes optimistically. Failures never escape as errors to the
//! UI; they become [`Notice`]s and the state stays either applied or rolled back.

pub mod collection;
pub mod config;
pub mod conversation;
pub mod cursor;
pub mod engine;
pub mod feed;
pub mod generation;
pub mod notice;
pub mod notifications;
pub mod optimistic;
pub mod session;
pub mod users;

pub use collection::{LiveCollection, Record};
pub use config::SyncConfig;
pub use conversation::{ConversationReconciler, OpenConversation, OpenOutcome};
pub use cursor::{PageCursor, PageOutcome, PageSkip, PageTicket};
pub use engine::{Backends, LoadSummary, SyncEngine};
pub use feed::{FeedReconciler, PostDetail};
pub use generation::{ViewGeneration, ViewToken};
pub use notice::{Notice, NoticeSink, Severity};
pub use notifications::NotificationReconciler;
pub use optimistic::{MutationError, Optimistic};
pub use session::Session;
pub use users::UserDirectory;
