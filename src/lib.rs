//! gtfsval library - reading and validating GTFS transit feeds.
//!
//! The library is split in two layers:
//!
//! - [`feed`] - table sources (directory or zip), streaming CSV rows, typed
//!   entities and the per-run [`FeedCache`]
//! - [`validation`] - notices, the rule engine, the bounded worker pool and
//!   the built-in rules
//!
//! # Example
//!
//! ```no_run
//! use gtfsval::{open_feed, ValidationConfig, ValidationEngine};
//! use std::path::Path;
//!
//! let source = open_feed(Path::new("./feed.zip")).expect("Failed to open feed");
//! let report = ValidationEngine::with_default_rules()
//!     .run(source, ValidationConfig::default())
//!     .expect("Feed could not be read");
//! for notice in &report.notices {
//!     println!("{notice}");
//! }
//! ```

pub mod feed;
pub mod validation;

// Re-export for convenience
pub use feed::{open_feed, CacheError, FeedCache, TableKind, TableSource};
pub use validation::{
    Notice, NoticeSink, Rule, RuleContext, Severity, ValidationConfig, ValidationEngine,
    ValidationReport,
};
