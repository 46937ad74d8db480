//! Validation configuration.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use time::{Date, OffsetDateTime};

/// Fallback worker count when the available parallelism cannot be queried.
const DEFAULT_WORKERS: usize = 4;

/// Shared cancellation flag, checked between entities by long-running rules.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a validation run.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Date the feed is checked against, e.g. for expired service.
    pub current_date: Date,

    /// Soft memory budget in bytes for rules that buffer whole tables.
    /// `None` means unbounded.
    pub max_memory: Option<u64>,

    /// Number of workers used by rules that fan out per-entity checks.
    pub parallel_workers: usize,

    /// ISO 3166-1 alpha-2 country code of the feed, empty when unknown.
    pub country_code: String,

    /// Cancellation flag for the run.
    pub cancel: CancelToken,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            current_date: OffsetDateTime::now_utc().date(),
            max_memory: None,
            parallel_workers: default_workers(),
            country_code: String::new(),
            cancel: CancelToken::new(),
        }
    }
}

impl ValidationConfig {
    /// Worker count for the bounded pool, never zero.
    pub fn workers(&self) -> usize {
        self.parallel_workers.max(1)
    }

    pub fn with_current_date(mut self, date: Date) -> Self {
        self.current_date = date;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        let code: String = code.into();
        self.country_code = code.to_ascii_uppercase();
        self
    }
}

/// Number of workers matching the machine's available parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_workers_never_zero() {
        let config = ValidationConfig::default().with_workers(0);
        assert_eq!(config.workers(), 1);
        assert!(ValidationConfig::default().workers() >= 1);
    }

    #[test]
    fn test_builder_methods() {
        let config = ValidationConfig::default()
            .with_current_date(date!(2024 - 06 - 01))
            .with_country_code("ca");
        assert_eq!(config.current_date, date!(2024 - 06 - 01));
        assert_eq!(config.country_code, "CA");
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let config = ValidationConfig::default();
        let clone = config.clone();
        assert!(!clone.cancel.is_cancelled());
        config.cancel.cancel();
        assert!(clone.cancel.is_cancelled());
    }
}
