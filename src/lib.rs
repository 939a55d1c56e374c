//! # Prometheus Fleet
//!
//! Bounded-concurrency orchestration core for fleets of browser-driven accounts.
//!
//! Each account owns a long-lived browser session. Several automation
//! categories (scavenging, building, recruiting, farming) run periodically
//! against every eligible account, sharing one executor that caps how many
//! sessions are driven at once. When an account needs a human (failed login,
//! anti-bot challenge) it is paused and handed to an admission queue that
//! opens at most a few visible windows at a time.
//!
//! ## Key Features
//!
//! - **Priority Executor**: At most `max_workers` tasks run; the rest wait in a
//!   priority queue (lower value first, FIFO on ties). A finishing task hands
//!   its slot directly to the queue head.
//! - **Session Pool**: One resident session per account with health checks and
//!   transparent recreation. Persistent or manual release policy.
//! - **Admission Queue**: FIFO of accounts needing a human, capped at
//!   `max_windows` open windows, refilled the moment a window closes.
//! - **Jittered Timing**: Every interval is randomized around its base so the
//!   fleet never runs on a fixed period.
//! - **Graceful Shutdown**: Drain with a deadline, discard the rest, close
//!   everything; a second signal exits immediately.
//!
//! ## Wiring
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_fleet::builders::OrchestratorBuilder;
//! use prometheus_fleet::config::OrchestratorConfig;
//! use prometheus_fleet::runtime::signals;
//!
//! let mut config = OrchestratorConfig::default();
//! config.apply_env_overrides()?;
//!
//! let scheduler = OrchestratorBuilder::new(config)
//!     .driver(Arc::new(my_driver))
//!     .store(Arc::new(my_store))
//!     .action("building", Arc::new(BuildingAction))
//!     .action("farming", Arc::new(FarmingAction))
//!     .build()?;
//!
//! scheduler.start()?;
//! let report = scheduler.shutdown_coordinator().listen(signals::listen()).await;
//! scheduler.join().await;
//! ```
//!
//! Browser automation itself lives behind [`core::BrowserDriver`] and
//! [`core::CategoryAction`]; this crate only decides when and how many.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Orchestration core: executor, sessions, admission, scheduler.
pub mod core;
/// Configuration models for the executor, sessions, windows, and categories.
pub mod config;
/// Builders to construct the orchestrator from configuration.
pub mod builders;
/// Infrastructure adapters: pending queue, account store, identity provider.
pub mod infra;
/// Runtime adapters: spawner, signals, status surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
