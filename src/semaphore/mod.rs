//! Semaphore UI API integration module.
//!
//! This module provides the HTTP client for the project environment endpoints,
//! their wire types, and the resource handler that runs create, read, update,
//! delete and import against them.

mod api;
mod client;
mod environment;
mod types;

pub use api::EnvironmentApi;
#[cfg(test)]
pub use api::MockEnvironmentApi;
pub use client::SemaphoreClient;
pub use environment::{EnvironmentResource, IMPORT_LABELS, RESOURCE_KIND};
pub use types::{Environment, EnvironmentRequest, EnvironmentSecret, EnvironmentSecretRequest};
