//! Fediload Swarm
//!
//! A simulated-user load generator for Mastodon-compatible servers. Each
//! virtual user logs in with a pre-provisioned credential, then performs
//! weighted random actions (timelines, posting, follows, bookmarks, search)
//! with think time in between.
//!
//! # Architecture
//!
//! - **Credential Pool**: accounts loaded once from the provisioning CSV
//! - **User Assigner**: thread-safe round-robin hand-out of credentials
//! - **Sessions**: per-user state and the HTTP calls behind every action
//! - **Runner**: spawn rate, run time, teardown and the test-stop reset
//! - **Metrics**: per-action counts and latency percentiles
//!
//! # Example
//!
//! ```ignore
//! use fediload_swarm::{Swarm, SwarmConfig};
//! use std::time::Duration;
//!
//! let config = SwarmConfig::new("https://mastodon.test", "test_users.csv")
//!     .with_users(50)
//!     .with_spawn_rate(5.0);
//!
//! let swarm = Swarm::new(config)?;
//! let report = swarm.run_for(Duration::from_secs(300)).await?;
//!
//! println!("RPS: {:.2}", report.requests_per_second());
//! ```

pub mod accounts;
pub mod actions;
pub mod check;
pub mod client;
pub mod config;
pub mod context;
pub mod metrics;
pub mod runner;
pub mod session;

pub use accounts::{AccountPoolError, AssignError, Assignment, CredentialPool, UserAssigner};
pub use actions::{Action, ActionTable, ActionTableError};
pub use check::{check_pool, CheckReport};
pub use client::{ClientError, MastodonClient};
pub use config::{ConfigError, ConfigFile, SwarmConfig};
pub use context::SwarmContext;
pub use metrics::{ActionSummary, MetricsCollector, SwarmReport};
pub use runner::{Swarm, SwarmError};
pub use session::{ActionOutcome, SessionState, SimUser};
