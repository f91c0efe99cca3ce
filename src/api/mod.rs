//! # HTTP API
//!
//! Axum router exposing the login routes, the strategy listing, AuthInfo
//! lookup and the health probe.

pub mod envelope;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use envelope::{Envelope, UserSummary};
pub use error::ApiError;
pub use routes::{build_router, ApiState, HealthFlag};
pub use server::{shutdown_signal, start_api_server};
