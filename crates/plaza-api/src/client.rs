use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use plaza_types::api::{Envelope, normalize_token};

use crate::error::ApiError;

/// REST client for the social API. Every call attaches the session bearer token
/// and unwraps the `{ success, data, msg }` envelope.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(normalize_token(token).to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let req = self.http.request(method, url).header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Sends the request and returns the envelope's `data`.
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let envelope = self.send::<T>(req).await?;
        envelope.into_result().map_err(ApiError::Rejected)
    }

    /// Sends the request and only checks `success`.
    pub(crate) async fn execute(&self, req: RequestBuilder) -> Result<(), ApiError> {
        let envelope = self.send::<serde_json::Value>(req).await?;
        envelope.into_unit().map_err(ApiError::Rejected)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Envelope<T>, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let msg = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.msg)
                .unwrap_or_default();
            warn!("API returned {}: {}", status, msg);
            return Err(ApiError::Status { status: status.as_u16(), msg });
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!(
                "Undecodable API response: {} -- raw: {}",
                e,
                String::from_utf8_lossy(&body[..body.len().min(200)])
            );
            ApiError::Decode(e.to_string())
        })
    }
}
