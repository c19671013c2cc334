//! Payment gateway server binary

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slh_gateway::bscscan::BscScanClient;
use slh_gateway::config::Config;
use slh_gateway::notify::Notifier;
use slh_gateway::pg_storage::PgStorage;
use slh_gateway::server::{run_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting SLH payment gateway");

    let config = Config::load()?;

    // Secrets come from the environment, never from config.toml.
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            error!("DATABASE_URL environment variable is required");
            anyhow::bail!("DATABASE_URL not set");
        }
    };

    let bot_token = match config.bot_token() {
        Some(token) => token,
        None => {
            error!("BOT_TOKEN environment variable is required");
            anyhow::bail!("BOT_TOKEN not set");
        }
    };

    let admin_token = config.admin_token();
    if admin_token.is_none() {
        warn!("ADMIN_DASH_TOKEN not set, admin endpoints will refuse all requests");
    }

    let chain_api_key = config.chain_api_key();

    let storage = PgStorage::new(&database_url).await?;
    info!("Connected to PostgreSQL");

    let notifier = Notifier::new(
        bot_token,
        config.telegram.moderators_chat_id.clone(),
        config.site.community_group_link.clone(),
    );
    let chain = BscScanClient::new(&config.chain, chain_api_key);

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = Arc::new(AppState {
        storage,
        notifier,
        chain,
        config,
        admin_token,
        started_at: Instant::now(),
    });

    run_server(&host, port, state).await
}
