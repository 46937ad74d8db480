use tracing::debug;

use crate::feed::{CacheError, TableKind};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// Required tables that are absent, plus files the registry does not know.
pub struct MissingFilesRule;

impl Rule for MissingFilesRule {
    fn name(&self) -> &'static str {
        "missing_files"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        for kind in TableKind::ALL.into_iter().filter(|k| k.is_required()) {
            if !ctx.source.exists(kind.file_name()) {
                ctx.report(
                    Notice::error("missing_required_file").with("filename", kind.file_name()),
                );
            }
        }

        if !ctx.source.exists(TableKind::Calendar.file_name())
            && !ctx.source.exists(TableKind::CalendarDates.file_name())
        {
            ctx.report(Notice::error("missing_calendar_and_calendar_date_files"));
        }

        for name in ctx.source.list() {
            if TableKind::from_file_name(&name).is_none() {
                debug!(file = %name, "unknown file in feed");
                ctx.report(Notice::info("unknown_file").with("filename", name));
            }
        }
        Ok(())
    }
}
