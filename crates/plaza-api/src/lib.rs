pub mod auth;
pub mod client;
pub mod error;
pub mod feed;
pub mod messages;
pub mod notifications;
pub mod users;

pub use auth::AuthApi;
pub use client::RestClient;
pub use error::ApiError;
pub use feed::FeedApi;
pub use messages::MessagesApi;
pub use notifications::NotificationsApi;
pub use users::UsersApi;
