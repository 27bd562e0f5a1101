//! palaver-server: REST API plus room-relay WebSocket in one process.
//!
//! Persists users, conversations, and messages in SQLite; relays live
//! message/typing/presence events between connected clients.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use clap::Parser;

use crate::relay::RelayState;
use crate::storage::Storage;

use config::{Cli, Config};
use state::AppState;

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::tlog!("palaver-server starting");
    crate::tlog!("  database: {}", config.db_path.display());

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create data directory");
    }
    let storage = Storage::open(&config.db_path).expect("failed to open database");

    let relay = RelayState::new();
    let state = AppState::shared(storage, relay);

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::tlog!("palaver-server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
