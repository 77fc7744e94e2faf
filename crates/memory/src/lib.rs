//! `dg-memory`: team memory collaborator client for driftguard.
//!
//! Provides the [`MemoryProvider`] trait, the REST implementation
//! ([`RestMemoryClient`]) and the wire DTOs. The proxy reads prior task
//! records for the static channel and writes finalized ones back.

pub mod provider;
pub mod rest;
pub mod types;

pub use provider::MemoryProvider;
pub use rest::RestMemoryClient;
pub use types::{MemoryDto, MemoryQuery, MemorySearchResponse, TaskSyncRequest};

use std::sync::Arc;

use dg_domain::config::MemoryConfig;
use dg_domain::error::Result;

/// Build the configured provider, or `None` when memory is disabled.
pub fn create_provider(cfg: &MemoryConfig) -> Result<Option<Arc<dyn MemoryProvider>>> {
    if !cfg.enabled {
        tracing::info!("team memory disabled");
        return Ok(None);
    }
    let provider: Arc<dyn MemoryProvider> = Arc::new(RestMemoryClient::new(cfg)?);
    tracing::info!(base_url = %cfg.base_url, "team memory client ready");
    Ok(Some(provider))
}
