use plaza_types::api::{AuthPayload, normalize_token};
use plaza_types::{User, UserId};

/// The signed-in user, read from persisted session state by the application
/// shell and handed to every reconciler. Reconcilers never modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user_id: UserId,
    user: Option<User>,
    token: Option<String>,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, user: None, token: None }
    }

    pub fn from_auth(auth: &AuthPayload) -> Self {
        Self {
            user_id: auth.user.id,
            user: Some(auth.user.clone()),
            token: Some(auth.bearer_token().to_string()),
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user_id = user.id;
        self.user = Some(user);
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(normalize_token(token).to_string());
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
