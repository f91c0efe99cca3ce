//! # Error Handling
//!
//! Error taxonomy for the authentication gateway. Every failure a login can
//! run into is mapped onto one of these kinds, and each kind carries the HTTP
//! status the API layer reports for it.

pub mod types;

pub use types::{Error, ErrorKind};

/// Custom result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;
