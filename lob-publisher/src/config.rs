//! Publisher Configuration
//!
//! Supports loading from environment variables with the LOB_PUBLISHER_ prefix.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Cardano network the publisher writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardanoNetwork {
    #[default]
    Mainnet,
    Preprod,
    Preview,
    Dev,
}

impl CardanoNetwork {
    /// Parse from string (for environment variables)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Some(Self::Mainnet),
            "preprod" => Some(Self::Preprod),
            "preview" => Some(Self::Preview),
            "dev" | "devnet" => Some(Self::Dev),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Preprod => "preprod",
            Self::Preview => "preview",
            Self::Dev => "dev",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub network: CardanoNetwork,
    /// Age after which a lease is considered abandoned
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_pull_limit")]
    pub transaction_pull_limit: usize,
    #[serde(default = "default_pull_limit")]
    pub report_pull_limit: usize,
    #[serde(default = "default_finality_pull_limit")]
    pub finality_pull_limit: usize,
    #[serde(default = "default_interval")]
    pub dispatch_interval_secs: u64,
    #[serde(default = "default_interval")]
    pub finality_interval_secs: u64,
    /// Bound on each build and submit call
    #[serde(default = "default_interval")]
    pub submit_timeout_secs: u64,
    /// Minutes a submitted entity may stay invisible before it is rolled back
    #[serde(default = "default_rollback_grace_period")]
    pub rollback_grace_period_minutes: u64,
    #[serde(default = "default_slots_per_minute")]
    pub slots_per_minute: u64,
}

fn default_lock_timeout() -> u64 {
    3 * 60 * 60
}

fn default_pull_limit() -> usize {
    50
}

fn default_finality_pull_limit() -> usize {
    500
}

fn default_interval() -> u64 {
    60
}

fn default_rollback_grace_period() -> u64 {
    15
}

fn default_slots_per_minute() -> u64 {
    60
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            network: CardanoNetwork::default(),
            lock_timeout_secs: default_lock_timeout(),
            transaction_pull_limit: default_pull_limit(),
            report_pull_limit: default_pull_limit(),
            finality_pull_limit: default_finality_pull_limit(),
            dispatch_interval_secs: default_interval(),
            finality_interval_secs: default_interval(),
            submit_timeout_secs: default_interval(),
            rollback_grace_period_minutes: default_rollback_grace_period(),
            slots_per_minute: default_slots_per_minute(),
        }
    }
}

impl PublisherConfig {
    /// Local devnet with fast ticks and short leases
    pub fn development() -> Self {
        Self {
            network: CardanoNetwork::Dev,
            lock_timeout_secs: 60,
            transaction_pull_limit: 10,
            report_pull_limit: 10,
            finality_pull_limit: 50,
            dispatch_interval_secs: 5,
            finality_interval_secs: 5,
            submit_timeout_secs: 10,
            rollback_grace_period_minutes: 1,
            slots_per_minute: default_slots_per_minute(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - LOB_PUBLISHER_NETWORK: mainnet, preprod, preview or dev
    /// - LOB_PUBLISHER_LOCK_TIMEOUT: lease timeout in seconds
    /// - LOB_PUBLISHER_TX_PULL_LIMIT / LOB_PUBLISHER_REPORT_PULL_LIMIT: lease batch sizes
    /// - LOB_PUBLISHER_FINALITY_PULL_LIMIT: entities inspected per finality tick
    /// - LOB_PUBLISHER_DISPATCH_INTERVAL / LOB_PUBLISHER_FINALITY_INTERVAL: tick periods in seconds
    /// - LOB_PUBLISHER_SUBMIT_TIMEOUT: build/submit bound in seconds
    /// - LOB_PUBLISHER_ROLLBACK_GRACE_MINUTES: rollback grace period
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|s| s.parse().ok())
        }

        let defaults = Self::default();
        Self {
            network: env::var("LOB_PUBLISHER_NETWORK")
                .ok()
                .and_then(|s| CardanoNetwork::parse(&s))
                .unwrap_or(defaults.network),
            lock_timeout_secs: var("LOB_PUBLISHER_LOCK_TIMEOUT").unwrap_or(defaults.lock_timeout_secs),
            transaction_pull_limit: var("LOB_PUBLISHER_TX_PULL_LIMIT").unwrap_or(defaults.transaction_pull_limit),
            report_pull_limit: var("LOB_PUBLISHER_REPORT_PULL_LIMIT").unwrap_or(defaults.report_pull_limit),
            finality_pull_limit: var("LOB_PUBLISHER_FINALITY_PULL_LIMIT").unwrap_or(defaults.finality_pull_limit),
            dispatch_interval_secs: var("LOB_PUBLISHER_DISPATCH_INTERVAL").unwrap_or(defaults.dispatch_interval_secs),
            finality_interval_secs: var("LOB_PUBLISHER_FINALITY_INTERVAL").unwrap_or(defaults.finality_interval_secs),
            submit_timeout_secs: var("LOB_PUBLISHER_SUBMIT_TIMEOUT").unwrap_or(defaults.submit_timeout_secs),
            rollback_grace_period_minutes: var("LOB_PUBLISHER_ROLLBACK_GRACE_MINUTES")
                .unwrap_or(defaults.rollback_grace_period_minutes),
            slots_per_minute: defaults.slots_per_minute,
        }
    }

    pub fn lock_timeout(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.lock_timeout_secs as i64)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Rollback grace period expressed in chain slots
    pub fn rollback_grace_slots(&self) -> u64 {
        self.rollback_grace_period_minutes * self.slots_per_minute
    }
}
