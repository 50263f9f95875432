//! Consistency layer for a marketing-insights document store.
//!
//! Entities (clients, brands, campaigns, surveys, responses, reward
//! programs) live in a schemaless document store and carry denormalized
//! copies of their parents' names. This crate owns the write paths that
//! keep those copies, the fan-out deletes and the counters coherent.

pub mod aggregation;
pub mod cascade;
pub mod config;
pub mod error;
pub mod models;
pub mod resolver;
pub mod service;
pub mod store;
pub mod timestamps;

pub use error::{Error, Result};
pub use service::{InsightsService, ServiceOptions};
