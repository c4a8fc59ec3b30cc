use async_trait::async_trait;
use reqwest::Method;

use plaza_types::User;
use plaza_types::api::{AuthPayload, LoginRequest, RegisterRequest};

use crate::client::RestClient;
use crate::error::ApiError;

/// Session lifecycle. The sync core never calls this; the application shell does.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<AuthPayload, ApiError>;

    async fn register(&self, req: &RegisterRequest) -> Result<AuthPayload, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    async fn me(&self) -> Result<User, ApiError>;
}

#[async_trait]
impl AuthApi for RestClient {
    async fn login(&self, req: &LoginRequest) -> Result<AuthPayload, ApiError> {
        self.fetch(self.request(Method::POST, "/auth/login").json(req)).await
    }

    async fn register(&self, req: &RegisterRequest) -> Result<AuthPayload, ApiError> {
        self.fetch(self.request(Method::POST, "/auth/register").json(req)).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.execute(self.request(Method::POST, "/auth/logout")).await
    }

    async fn me(&self) -> Result<User, ApiError> {
        self.fetch(self.request(Method::POST, "/auth/me")).await
    }
}
