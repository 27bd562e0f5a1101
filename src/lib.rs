pub mod client;
pub mod logging;
pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod server;
pub mod storage;
pub mod transport;
