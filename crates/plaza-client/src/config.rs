use std::time::Duration;

use anyhow::{Context, bail};

use plaza_sync::SyncConfig;
use plaza_types::UserId;

/// How the client signs in.
pub enum Credentials {
    /// A personal access token, optionally with the user id it belongs to.
    Token { token: String, user_id: Option<UserId> },
    Password { email: String, password: String },
}

pub struct Config {
    pub api_url: String,
    pub credentials: Credentials,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("PLAZA_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/api".into());

        let token = std::env::var("PLAZA_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let credentials = match token {
            Some(token) => {
                let user_id = std::env::var("PLAZA_USER_ID")
                    .ok()
                    .map(|v| v.parse::<u64>().map(UserId))
                    .transpose()
                    .context("PLAZA_USER_ID must be a number")?;
                Credentials::Token { token, user_id }
            }
            None => {
                let (Ok(email), Ok(password)) = (std::env::var("PLAZA_EMAIL"), std::env::var("PLAZA_PASSWORD")) else {
                    bail!("set PLAZA_TOKEN, or PLAZA_EMAIL and PLAZA_PASSWORD");
                };
                Credentials::Password { email, password }
            }
        };

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            users_page_size: env_or("PLAZA_USERS_PAGE_SIZE", defaults.users_page_size)?,
            notifications_page_size: env_or("PLAZA_NOTIFICATIONS_PAGE_SIZE", defaults.notifications_page_size)?,
            search_debounce: Duration::from_millis(env_or(
                "PLAZA_SEARCH_DEBOUNCE_MS",
                defaults.search_debounce.as_millis() as u64,
            )?),
            notice_ttl: defaults.notice_ttl,
            rollback_failed_reads: env_flag("PLAZA_ROLLBACK_FAILED_READS", defaults.rollback_failed_reads)?,
        };

        Ok(Self { api_url, credentials, sync })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("invalid {}", key)),
        Err(_) => Ok(default),
    }
}

/// Boolean switches accept `true`/`false` as well as `1`/`0`, `yes`/`no` and `on`/`off`.
fn env_flag(key: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(key) {
        Ok(raw) => parse_flag(&raw).with_context(|| format!("invalid {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
