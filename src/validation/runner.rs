//! Rule dispatch.
//!
//! The engine runs its registered rules one after another against a shared
//! [`RuleContext`]. Rules only report through the notice sink; the `Err` path
//! of [`Rule::validate`] is reserved for failures of the feed itself, which
//! abort the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use super::config::ValidationConfig;
use super::notice::{count_by_severity, Notice, NoticeSink, Severity};
use super::rules::default_rules;
use crate::feed::{CacheError, FeedCache, TableSource};

/// A single validation rule.
pub trait Rule: Send + Sync {
    /// Stable name used in logs and in the report.
    fn name(&self) -> &'static str;

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError>;
}

/// Everything a rule gets to see during a run.
#[derive(Clone)]
pub struct RuleContext {
    pub source: Arc<dyn TableSource>,
    pub cache: Arc<FeedCache>,
    pub sink: Arc<NoticeSink>,
    pub config: Arc<ValidationConfig>,
}

impl RuleContext {
    /// Fresh cache and sink over `source`.
    pub fn new(source: Arc<dyn TableSource>, config: ValidationConfig) -> Self {
        Self {
            cache: Arc::new(FeedCache::new(Arc::clone(&source))),
            source,
            sink: Arc::new(NoticeSink::new()),
            config: Arc::new(config),
        }
    }

    pub fn report(&self, notice: Notice) {
        self.sink.add(notice);
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Notice count per severity, every severity present.
    pub counts: BTreeMap<Severity, usize>,
    /// Names of the rules that ran, in order.
    pub rules_run: Vec<&'static str>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    pub notices: Vec<Notice>,
}

impl ValidationReport {
    fn new(notices: Vec<Notice>, rules_run: Vec<&'static str>, cancelled: bool) -> Self {
        Self {
            counts: count_by_severity(&notices),
            rules_run,
            cancelled,
            notices,
        }
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.counts.get(&severity).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// Notices with the given code, in report order.
    pub fn notices_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Notice> {
        self.notices.iter().filter(move |n| n.code == code)
    }
}

/// Registry of rules and the loop that runs them.
#[derive(Default)]
pub struct ValidationEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl ValidationEngine {
    /// An engine with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with every built-in rule registered.
    pub fn with_default_rules() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn register(&mut self, rule: impl Rule + 'static) -> &mut Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Validate the feed behind `source` with a fresh cache and sink.
    pub fn run(
        &self,
        source: Arc<dyn TableSource>,
        config: ValidationConfig,
    ) -> Result<ValidationReport, CacheError> {
        self.run_with(&RuleContext::new(source, config))
    }

    /// Run every rule against an existing context.
    ///
    /// The context's cache is cleared when the run ends, successfully or not.
    pub fn run_with(&self, ctx: &RuleContext) -> Result<ValidationReport, CacheError> {
        info!(
            feed = %ctx.source.location(),
            rules = self.rules.len(),
            workers = ctx.config.workers(),
            current_date = %ctx.config.current_date,
            country_code = %ctx.config.country_code,
            max_memory = ?ctx.config.max_memory,
            "starting validation"
        );

        let result = self.dispatch(ctx);
        ctx.cache.clear();
        let (rules_run, cancelled) = result?;

        let report = ValidationReport::new(ctx.sink.all(), rules_run, cancelled);
        info!(
            errors = report.count(Severity::Error),
            warnings = report.count(Severity::Warning),
            infos = report.count(Severity::Info),
            "validation finished"
        );
        Ok(report)
    }

    fn dispatch(&self, ctx: &RuleContext) -> Result<(Vec<&'static str>, bool), CacheError> {
        let mut rules_run = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if ctx.config.cancel.is_cancelled() {
                warn!(next_rule = rule.name(), "validation cancelled");
                return Ok((rules_run, true));
            }

            let _span = info_span!("rule", name = rule.name()).entered();
            let before = ctx.sink.len();
            match rule.validate(ctx) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "feed unreadable, aborting run");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "rule skipped"),
            }
            debug!(notices = ctx.sink.len() - before, "rule finished");
            rules_run.push(rule.name());
        }
        Ok((rules_run, false))
    }
}
