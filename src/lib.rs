//! Chat-driven song request queue: admission, queue bookkeeping and
//! rate-limited private notifications.

pub mod admission;
pub mod command;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod facade;
pub mod format;
pub mod metadata;
pub mod publish;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils {
    pub mod jwt;
}
