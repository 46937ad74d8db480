//! Validation notices and the shared sink rules report them to.
//!
//! - [`Severity`] - `INFO`, `WARNING` or `ERROR`
//! - [`Notice`] - one finding: a snake_case code, a severity and a context map
//! - [`NoticeSink`] - append-only, thread-safe collection of notices

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How serious a notice is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Error];

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub code: String,
    pub severity: Severity,
    /// Named values locating the finding, e.g. `filename` and `csvRowNumber`.
    pub context: Map<String, Value>,
}

impl Notice {
    pub fn new(code: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            severity,
            context: Map::new(),
        }
    }

    pub fn error(code: impl Into<String>) -> Self {
        Self::new(code, Severity::Error)
    }

    pub fn warning(code: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning)
    }

    pub fn info(code: impl Into<String>) -> Self {
        Self::new(code, Severity::Info)
    }

    /// Attach a context value. Later values for the same key replace earlier ones.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity, self.code)?;
        for (key, value) in &self.context {
            match value {
                Value::String(s) => write!(f, " {key}={s}")?,
                other => write!(f, " {key}={other}")?,
            }
        }
        Ok(())
    }
}

/// Thread-safe, append-only collection of notices for one run.
///
/// Notices from a single thread keep their insertion order. Interleaving
/// across threads is unspecified.
#[derive(Debug, Default)]
pub struct NoticeSink {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }

    pub fn extend(&self, notices: impl IntoIterator<Item = Notice>) {
        self.notices.lock().extend(notices);
    }

    /// Snapshot of every notice added so far.
    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }

    /// Count per severity. Every severity is present, possibly with zero.
    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        count_by_severity(&self.notices.lock())
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.notices
            .lock()
            .iter()
            .any(|n| n.severity == Severity::Error)
    }

    /// Number of notices with the given code.
    pub fn count_code(&self, code: &str) -> usize {
        self.notices.lock().iter().filter(|n| n.code == code).count()
    }
}

pub(crate) fn count_by_severity(notices: &[Notice]) -> BTreeMap<Severity, usize> {
    let mut counts: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|&s| (s, 0)).collect();
    for notice in notices {
        *counts.entry(notice.severity).or_default() += 1;
    }
    counts
}
