//! Redirecting forwarder that serves a conda channel out of an OCI
//! registry (GHCR).
//!
//! A package manager pointed at this service as a plain HTTP channel is
//! answered, per artifact, with a redirect to the content-addressed blob
//! backing the corresponding OCI manifest:
//! - artifact file names are parsed into a package identity and tag
//! - pull tokens are fetched once and reused across requests
//! - the manifest layer matching the requested package format picks the blob
//! - the registry's blob redirect is relayed to the caller

pub mod artifact;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod state;

pub use config::Config;
pub use http::handler::{create_router, AppError};
pub use state::AppState;
