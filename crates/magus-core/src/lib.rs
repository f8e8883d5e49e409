//! Magus Core Library
//!
//! Operations client for the Magus freight email-automation backend:
//! REST client, inbox pagination, decision submission, chart and
//! leaderboard aggregation, dataset cache and the chat assistant.

pub mod aggregate;
pub mod api;
pub mod assistant;
pub mod cache;
pub mod config;
pub mod error;
pub mod inbox;
pub mod mapper;
pub mod models;
pub mod review;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, MagusApi};
pub use config::Config;
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "magus";
