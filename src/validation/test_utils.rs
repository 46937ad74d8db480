//! Shared test utilities.
//!
//! [`MemorySource`] is an in-memory [`TableSource`] that counts how often each
//! table is opened, so tests can assert how many times the cache really went
//! to the source.

use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::feed::{FeedCache, RecordStream, SourceError, TableSource};
use crate::validation::{NoticeSink, RuleContext, ValidationConfig};

/// In-memory table source with open counters.
pub struct MemorySource {
    tables: HashMap<String, Vec<u8>>,
    opens: Mutex<HashMap<String, usize>>,
    open_delay: Option<Duration>,
    fail_opens: AtomicBool,
}

impl MemorySource {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            tables: files
                .iter()
                .map(|(name, content)| (name.to_string(), content.as_bytes().to_vec()))
                .collect(),
            opens: Mutex::new(HashMap::new()),
            open_delay: None,
            fail_opens: AtomicBool::new(false),
        }
    }

    /// Add or replace a table with raw bytes, e.g. content that is not UTF-8.
    pub fn with_table_bytes(mut self, name: &str, content: &[u8]) -> Self {
        self.tables.insert(name.to_string(), content.to_vec());
        self
    }

    /// Sleep inside every `open`, widening the window for racing callers.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Make every `open` fail as if the feed were unreadable.
    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self, name: &str) -> usize {
        self.opens.lock().get(name).copied().unwrap_or(0)
    }
}

impl TableSource for MemorySource {
    fn open(&self, name: &str) -> Result<RecordStream, SourceError> {
        *self.opens.lock().entry(name.to_string()).or_default() += 1;
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(SourceError::OpenFailed {
                path: "memory".to_string(),
                message: "simulated failure".to_string(),
            });
        }
        let content = self
            .tables
            .get(name)
            .ok_or_else(|| SourceError::NotFound(name.to_string()))?;
        RecordStream::new(name, Box::new(Cursor::new(content.clone()))).map_err(
            |err| SourceError::InvalidTable {
                table: name.to_string(),
                message: err.to_string(),
            },
        )
    }

    fn exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn list(&self) -> BTreeSet<String> {
        self.tables.keys().cloned().collect()
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Build a rule context over an in-memory feed.
pub fn context_for(files: &[(&str, &str)]) -> RuleContext {
    context_with_config(files, ValidationConfig::default())
}

pub fn context_with_config(files: &[(&str, &str)], config: ValidationConfig) -> RuleContext {
    context_over(MemorySource::new(files), config)
}

pub fn context_over(source: MemorySource, config: ValidationConfig) -> RuleContext {
    let source: Arc<dyn TableSource> = Arc::new(source);
    RuleContext {
        cache: Arc::new(FeedCache::new(Arc::clone(&source))),
        source,
        sink: Arc::new(NoticeSink::new()),
        config: Arc::new(config),
    }
}

/// A small feed that passes every built-in rule.
pub const VALID_FEED: &[(&str, &str)] = &[
    (
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone\nA1,Metro,https://example.com,America/Montreal\n",
    ),
    (
        "stops.txt",
        "stop_id,stop_name,stop_lat,stop_lon\nS1,First,45.50,-73.56\nS2,Second,45.51,-73.57\nS3,Third,45.52,-73.58\n",
    ),
    (
        "routes.txt",
        "route_id,agency_id,route_short_name,route_long_name,route_type\nR1,A1,1,Downtown,3\n",
    ),
    (
        "trips.txt",
        "route_id,service_id,trip_id\nR1,WK,T1\nR1,WK,T2\n",
    ),
    (
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         T1,08:00:00,08:00:00,S1,1\n\
         T1,08:05:00,08:06:00,S2,2\n\
         T1,08:10:00,08:10:00,S3,3\n\
         T2,09:00:00,09:00:00,S1,1\n\
         T2,,,S2,2\n\
         T2,09:10:00,09:10:00,S3,3\n",
    ),
    (
        "calendar.txt",
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
         WK,1,1,1,1,1,0,0,20240101,20991231\n",
    ),
];

/// `VALID_FEED` with one table replaced or added.
pub fn feed_with(
    name: &'static str,
    content: &'static str,
) -> Vec<(&'static str, &'static str)> {
    let mut files = feed_without(name);
    files.push((name, content));
    files
}

/// `VALID_FEED` without one table.
pub fn feed_without(name: &str) -> Vec<(&'static str, &'static str)> {
    VALID_FEED
        .iter()
        .copied()
        .filter(|(file, _)| *file != name)
        .collect()
}
