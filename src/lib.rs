//! # cmab-cache
//!
//! Client-side decision cache for contextual multi-armed bandit (CMAB)
//! experiments.
//!
//! Given a user and a CMAB rule, [`CmabService`] returns a variation
//! assignment. It reuses a prior assignment while the user's relevant
//! attributes are unchanged and calls the remote prediction service otherwise.
//!
//! ## Features
//!
//! - **Bounded:** LRU eviction with a capacity limit and optional TTL
//! - **Attribute aware:** Cached decisions are fingerprinted by the attributes
//!   the rule consumes, so an attribute change triggers a new prediction
//! - **Stampede safe:** Striped locks allow at most one in-flight request per
//!   `(user, rule)` pair while unrelated pairs proceed in parallel
//! - **Resilient:** Exponential backoff retries with a capped wait
//! - **Pluggable:** Bring your own HTTP transport, project config or metrics
//!
//! ## Quick Start
//!
//! ```ignore
//! use cmab_cache::{
//!     CmabService, DecideOption, DecideOptions, UserContext,
//!     client::{DefaultCmabClient, ReqwestTransport},
//!     project::StaticProjectConfig,
//! };
//!
//! // 1. Describe which attributes the rule consumes
//! let project = StaticProjectConfig::new()
//!     .with_attribute("attr_1", "age")
//!     .with_cmab_experiment("exp_1", ["attr_1"]);
//!
//! // 2. Build the service (Clone is cheap - just Arc increments)
//! let service = CmabService::new(DefaultCmabClient::new(ReqwestTransport::new()));
//!
//! // 3. Ask for a decision
//! let user = UserContext::new("user_123").with_attribute("age", 31);
//! let response = service
//!     .get_decision(&project, &user, "exp_1", DecideOptions::empty())
//!     .await?;
//!
//! // 4. Force a new prediction for this user only
//! let refreshed = service
//!     .get_decision(&project, &user, "exp_1", DecideOption::InvalidateUserCmabCache.into())
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod cache;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod observability;
pub mod options;
pub mod project;
pub mod service;

// Re-exports for convenience
pub use cache::BoundedCache;
pub use client::{CmabClient, DefaultCmabClient, HttpTransport};
pub use config::{CmabConfig, RetryPolicy};
pub use entity::{CacheEntry, Decision, DecisionResponse, UserContext};
pub use error::{Error, Result};
pub use options::{DecideOption, DecideOptions};
pub use project::ProjectConfig;
pub use service::CmabService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
