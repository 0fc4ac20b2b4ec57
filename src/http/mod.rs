//! Inbound HTTP layer.
//!
//! This module provides the axum-based HTTP server that receives channel
//! download requests and answers them with redirects into the upstream
//! registry's blob store.

pub mod handler;
