//! # authn
//!
//! Authentication gateway for Kubernetes-backed platforms. A user logs in with
//! one of several strategies (HTTP Basic, LDAP, generic OAuth2, GitHub, OIDC);
//! the gateway normalizes the identity, obtains a short-lived mTLS client
//! certificate through the cluster's CSR API and hands back a kubeconfig.
//!
//! ```text
//! HTTP API → Login Strategy → UserInfo → Issuance Engine → Kubeconfig Generator
//!                 ↓                            ↓                    ↓
//!          ConfigResolver              CSR client (kube)      AuthInfo Store
//! ```
//!
//! The cluster-facing collaborators sit behind traits
//! ([`resolvers::ConfigResolver`], [`resolvers::SecretStore`],
//! [`issuance::CsrClient`], [`kubeconfig::AuthInfoStore`]) so the core runs
//! against in-memory fakes in tests.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod identity;
pub mod issuance;
pub mod kubeconfig;
pub mod observability;
pub mod resolvers;
pub mod session;
pub mod signup;
pub mod strategies;

pub use config::AppConfig;
pub use errors::{Error, Result};
pub use identity::UserInfo;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
