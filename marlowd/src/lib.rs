//! Marlow Daemon
//!
//! Feed adapter, dedupe, pipeline workers and the wiring that turns the
//! rule runtime plus its adapters into a running post-trade engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod daemon;
pub mod dead_letter;
pub mod dedupe;
pub mod error;
pub mod feed;
pub mod worker;

pub use config::{Config, Environment, FeedConfig, GatewayConfig};
pub use daemon::Daemon;
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use dedupe::DedupeSet;
pub use error::{DaemonError, DaemonResult};
pub use feed::{FeedMessage, FeedSource, InMemoryFeed};
pub use worker::{Disposition, PipelineWorker};
