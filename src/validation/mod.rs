//! Rule-based validation of a GTFS feed.
//!
//! A run wires one [`FeedCache`](crate::feed::FeedCache) and one
//! [`NoticeSink`] into a [`RuleContext`] and hands it to each registered
//! [`Rule`] in turn. Rules never fail on bad data; they report notices.
//!
//! # Execution
//!
//! Rules run sequentially. Inside a rule, independent per-entity work can be
//! fanned out over a bounded pool with [`for_each_bounded`]; the cache is
//! warmed before the fan-out, so workers only read it.
//!
//! # Entry Points
//!
//! - [`ValidationEngine::with_default_rules`] - engine with every built-in rule
//! - [`ValidationEngine::run`] - validate one feed and produce a [`ValidationReport`]

mod config;
mod notice;
mod pool;
pub mod rules;
mod runner;
#[cfg(test)]
pub(crate) mod test_utils;

// Re-export configuration
pub use config::{default_workers, CancelToken, ValidationConfig};

// Re-export notice types
pub use notice::{Notice, NoticeSink, Severity};

// Re-export the worker pool
pub use pool::{for_each_bounded, PoolOutcome};

// Re-export the runner
pub use runner::{Rule, RuleContext, ValidationEngine, ValidationReport};
