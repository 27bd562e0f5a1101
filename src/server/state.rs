//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::relay::RelayState;
use crate::storage::Storage;

/// State behind every REST handler.  Storage is synchronous SQLite guarded
/// by an async mutex; the relay keeps its own registry and lock.
pub struct AppState {
    pub storage: Mutex<Storage>,
    pub relay: RelayState,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn shared(storage: Storage, relay: RelayState) -> SharedState {
        Arc::new(AppState {
            storage: Mutex::new(storage),
            relay,
        })
    }
}
