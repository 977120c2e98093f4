//! Tenbill API Library
//!
//! HTTP surface for the tenant-scoped billing core: provider webhook
//! intake, login-time customer provisioning, checkout intents, and
//! admin cleanup sweeps.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
