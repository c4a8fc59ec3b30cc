mod config;
mod relay;

use std::sync::Arc;

use tracing::{info, warn};

use plaza_api::{AuthApi, RestClient};
use plaza_gateway::EventBus;
use plaza_sync::{Backends, NoticeSink, Session, Severity, SyncEngine};
use plaza_types::api::LoginRequest;

use crate::config::{Config, Credentials};
use crate::relay::StdoutTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout belongs to the relay bridge.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza=debug,plaza_sync=debug,plaza_gateway=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let client = RestClient::new(&config.api_url);

    // Sign in
    let (client, session) = match config.credentials {
        Credentials::Token { token, user_id } => {
            let client = client.with_token(&token);
            let session = match user_id {
                Some(id) => Session::new(id).with_token(&token),
                None => Session::new(client.me().await?.id).with_token(&token),
            };
            (client, session)
        }
        Credentials::Password { email, password } => {
            let auth = client.login(&LoginRequest { email, password }).await?;
            let session = Session::from_auth(&auth);
            (client.with_token(auth.bearer_token()), session)
        }
    };
    info!("Signed in as user {} against {}", session.user_id(), client.base_url());

    // Notices
    let (notices, mut notice_rx) = NoticeSink::channel(config.sync.notice_ttl);
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            match notice.severity {
                Severity::Error => warn!("{}", notice.message),
                _ => info!("{}", notice.message),
            }
        }
    });

    // Engine
    let bus = EventBus::new(Arc::new(StdoutTransport));
    let engine = SyncEngine::new(session, bus.clone(), Backends::rest(client), notices, &config.sync);
    let summary = engine.start().await;
    info!(
        "Loaded {} posts, {} chatrooms ({} unread), {} notifications ({} unread)",
        engine.feed.posts().len(),
        engine.conversations.chatrooms().len(),
        engine.conversations.unread_total(),
        engine.notifications.notifications().len(),
        engine.notifications.unread_count(),
    );
    if !(summary.feed.is_loaded() && summary.chatrooms.is_loaded() && summary.notifications.is_loaded()) {
        warn!("Initial load incomplete: {:?}", summary);
    }
    engine.spawn_reconnect_watcher();

    tokio::select! {
        result = relay::pump_stdin(bus) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    engine.shutdown();
    Ok(())
}
