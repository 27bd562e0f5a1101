//! Configuration types and constants for the palaver server.

use std::path::PathBuf;

use clap::Parser;

/// Chat server: REST API for users, conversations, and messages, plus a
/// room-based WebSocket relay for live delivery, typing indicators, and
/// presence.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "palaver-server", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: PALAVER_BIND] [default: 127.0.0.1:5000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Database file path [env: PALAVER_DB] [default: palaver.db in the data dir]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Data directory [env: PALAVER_HOME] [default: ~/.palaver]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("PALAVER_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".palaver"))
                    .unwrap_or_else(|_| PathBuf::from(".palaver"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("PALAVER_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:5000".to_string());

        let db_path = cli
            .db
            .or_else(|| std::env::var("PALAVER_DB").ok().map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join("palaver.db"));

        Self { bind_addr, db_path }
    }
}
