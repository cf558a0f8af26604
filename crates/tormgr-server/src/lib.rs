//! HTTP server for tormgr: authentication, cached folder and torrent reads,
//! configuration, logging and metrics.

pub mod auth;
pub mod bootstrap;
pub mod cacheable;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use bootstrap::{Bootstrapped, bootstrap};
pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use server::{ServerBuilder, TormgrServer, build_app};
pub use state::AppState;
