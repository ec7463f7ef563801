//! Rust library for controlling Somfy myLink shades over the Synergy API
//!
//! This library provides an async client for the myLink JSON-over-TCP
//! protocol. It supports:
//!
//! - Sending `up`/`down`/`stop` commands to individual targets
//! - Connection pooling with TCP keep-alive between bursts of commands
//! - Correlating replies to requests by id on shared connections
//! - Batching commands issued close together, collapsing them into
//!   composite targets (a channel programmed to move several shades at once)
//!
//! # Direct Control
//!
//! ```no_run
//! use mylink_synergy::SynergyClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SynergyClient::new("192.168.1.50", "MySystem")?;
//!     let shade = client.target("CC0F1A42.1")?;
//!     shade.down().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Composite Targets
//!
//! Suppose target `.3` is a channel that drives both `.1` and `.2`. Wrapping
//! the client in a [`CommandScheduler`] turns "`.1` up, `.2` up" issued within
//! the debounce window into a single "`.3` up", so both shades start together:
//!
//! ```no_run
//! use mylink_synergy::{CommandScheduler, CompositeMapping, SchedulerConfig, SynergyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SynergyClient::new("192.168.1.50", "MySystem")?;
//!     let composites = CompositeMapping::new()
//!         .with("CC0F1A42.1", Vec::<String>::new())
//!         .with("CC0F1A42.2", Vec::<String>::new())
//!         .with("CC0F1A42.3", ["CC0F1A42.1", "CC0F1A42.2"]);
//!     let scheduler = CommandScheduler::new(client, SchedulerConfig::new(composites));
//!
//!     let left = scheduler.target("CC0F1A42.1").up();
//!     let right = scheduler.target("CC0F1A42.2").up();
//!     println!("{:?} {:?}", left.await?, right.await?);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Scheduler**: debounce window, per-method grouping, fan-out of results
//! - **Composite**: reduction of a batch against the composite mapping
//! - **Client**: target validation, request ids, timeouts
//! - **Pool / Connection**: TCP sockets and reply correlation
//! - **Protocol**: JSON message structures

mod client;
mod composite;
mod config;
mod connection;
mod debounce;
mod error;
mod pool;
mod protocol;
mod scheduler;
mod sink;
mod types;

// Public exports
pub use client::{SynergyClient, Target};
pub use composite::{reduce, Absorb, Batch};
pub use config::{ReductionMode, SchedulerConfig, SynergyConfig, DEFAULT_PORT};
pub use debounce::Debouncer;
pub use error::{Result, SynergyError};
pub use protocol::{validate_target_id, Params, Reply, Request};
pub use scheduler::{CommandScheduler, PendingCommand, ScheduledTarget};
pub use sink::CommandSink;
pub use types::{Command, CompositeEntry, CompositeMapping, Method, TargetId, METHOD_NAMESPACE};
