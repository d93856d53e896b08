//! Herald server
//!
//! Receives EventSub webhooks, announces streams to social platforms, and
//! serves the login and token endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use herald_core::HeraldConfig;
use herald_core::tracing_init::init_tracing;
use herald_crypto::{SecretSealer, WebhookVerifier};

use herald_server::auth::{AuthGate, AuthService, CredentialStore, DiscordIdentity, TokenCodec};
use herald_server::eventsub::{DedupLedger, HelixClient, StreamLifecycleTracker};
use herald_server::fanout::{
    BlueskyPublisher, DiscordPublisher, FanoutPublisher, MastodonPublisher, Publisher,
};
use herald_server::http::build_http_client;
use herald_server::pipeline::EventPipeline;
use herald_server::server::{AppState, build_router};
use herald_server::storage::HeraldDatabase;

#[derive(Parser, Debug)]
#[command(name = "herald-server")]
#[command(version, about = "Herald - stream announcement bot server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "HERALD_LISTEN_ADDR")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "HERALD_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to a JSON configuration file.
    #[arg(long, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("herald_server=info,tower_http=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting herald-server"
    );

    let config = HeraldConfig::load(args.config.as_deref())?;

    let db_path = match args.db_path {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening herald database");
    let db = HeraldDatabase::open(&db_path).await?;

    let http = build_http_client(Duration::from_secs(config.http.request_timeout_secs))?;

    // Auth
    let sealer = Arc::new(SecretSealer::from_hex_key(&config.auth.sealing_key)?);
    let store = CredentialStore::new(db.clone(), sealer);
    let codec = TokenCodec::new(
        config.bot.identity.clone(),
        config.auth.access_ttl_secs,
        config.auth.refresh_ttl_secs,
        store,
    );
    let gate = AuthGate::new(codec, config.bot.operator_token.clone());
    let identity = Arc::new(DiscordIdentity::new(config.discord.clone(), http.clone()));
    let auth = Arc::new(AuthService::new(gate, identity, config.auth.static_ttl_secs));

    // Event intake
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if config.discord.publishing_enabled() {
        publishers.push(Arc::new(DiscordPublisher::new(config.discord.clone(), http.clone())));
    }
    if config.mastodon.publishing_enabled() {
        publishers.push(Arc::new(MastodonPublisher::new(config.mastodon.clone(), http.clone())));
    }
    if config.bluesky.publishing_enabled() {
        publishers.push(Arc::new(BlueskyPublisher::new(config.bluesky.clone(), http.clone())));
    }
    let fanout = FanoutPublisher::new(publishers);
    info!(platforms = ?fanout.platforms(), "Announcement platforms configured");

    let source = Arc::new(HelixClient::new(config.twitch.clone(), http));
    let tracker =
        StreamLifecycleTracker::new(db.clone(), config.eventsub.debounce_secs, source, fanout);
    let pipeline = EventPipeline::new(
        Arc::new(WebhookVerifier::new(config.eventsub.webhook_secret.as_bytes())),
        DedupLedger::new(db),
        tracker,
    );

    let app = build_router(AppState { pipeline, auth }, &config.http.cors_origins);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Herald server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("Herald stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".herald").join("herald.db"))
}
