//! Accounting core configuration
//!
//! Supports loading from environment variables with the LOB_CORE_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Lifetime of a raw extraction waiting for processing, in seconds
    #[serde(default = "default_ingestion_cache_ttl")]
    pub ingestion_cache_ttl_secs: u64,
    /// Transactions processed and attached per chunk
    #[serde(default = "default_ingestion_chunk_size")]
    pub ingestion_chunk_size: usize,
}

fn default_ingestion_cache_ttl() -> u64 {
    900
}

fn default_ingestion_chunk_size() -> usize {
    100
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            ingestion_cache_ttl_secs: default_ingestion_cache_ttl(),
            ingestion_chunk_size: default_ingestion_chunk_size(),
        }
    }
}

impl CoreConfig {
    /// Small chunks and a short hand-off window
    pub fn development() -> Self {
        Self {
            ingestion_cache_ttl_secs: 60,
            ingestion_chunk_size: 10,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - LOB_CORE_INGESTION_CACHE_TTL: hand-off lifetime in seconds
    /// - LOB_CORE_INGESTION_CHUNK_SIZE: transactions per chunk
    pub fn from_env() -> Self {
        Self {
            ingestion_cache_ttl_secs: env::var("LOB_CORE_INGESTION_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_ingestion_cache_ttl),
            ingestion_chunk_size: env::var("LOB_CORE_INGESTION_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(default_ingestion_chunk_size),
        }
    }

    pub fn ingestion_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ingestion_cache_ttl_secs)
    }
}
