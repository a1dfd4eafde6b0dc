//! `DeskChat` stub backend -- in-memory support chat server.
//!
//! An axum server implementing the support-chat endpoints over a single
//! in-memory conversation. Desk replies are injected with
//! `POST /support/chat/replies`.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8787
//! cargo run --bin deskchat-stub
//!
//! # Require a bearer token
//! cargo run --bin deskchat-stub -- --bind 127.0.0.1:9000 --token secret
//!
//! # Inject a desk reply
//! curl -X POST localhost:8787/support/chat/replies \
//!     -H 'content-type: application/json' -d '{"message":"Hello!"}'
//! ```

use std::sync::Arc;

use clap::Parser;
use deskchat_stub::config::{StubCliArgs, StubConfig};
use deskchat_stub::server::{self, StubState};
use deskchat_stub::store::ConversationStore;

#[tokio::main]
async fn main() {
    let cli = StubCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match StubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        addr = %config.bind_addr,
        auth = config.token.is_some(),
        "starting deskchat stub backend"
    );

    let store =
        ConversationStore::with_max_history(config.max_history).with_self_role(&config.self_role);
    let state = Arc::new(StubState::with_config(
        config.token.clone(),
        store,
        config.self_role.clone(),
        config.counterpart_role.clone(),
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "stub backend listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "stub server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start stub backend");
            std::process::exit(1);
        }
    }
}
