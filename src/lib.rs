// Core modules
pub mod api;
pub mod backfill;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod models;
pub mod retry;

// Re-export commonly used types
pub use api::{BitMexClient, ExchangeGateway};
pub use bridge::{Bridge, BridgeSettings};
pub use config::{BridgeConfig, ConfigReconciler};
pub use models::*;

// Error handling
pub use error::{BridgeError, Result};
