use std::collections::HashSet;

use crate::feed::{CacheError, SourceError, TableKind};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// Header checks for every known table present in the feed.
pub struct RequiredColumnsRule;

impl Rule for RequiredColumnsRule {
    fn name(&self) -> &'static str {
        "required_columns"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        // Headers are not cached; read them straight from the feed.
        let source = ctx.cache.source();
        for kind in TableKind::ALL {
            let filename = kind.file_name();
            if !source.exists(filename) {
                continue;
            }
            let stream = match source.open(filename) {
                Ok(stream) => stream,
                Err(SourceError::NotFound(_)) => continue,
                Err(SourceError::InvalidTable { message, .. }) => {
                    ctx.report(
                        Notice::error("csv_parsing_failed")
                            .with("filename", filename)
                            .with("message", message),
                    );
                    continue;
                }
                Err(e) => return Err(CacheError::Source(e)),
            };

            let header = stream.headers();
            if header.iter().all(|name| name.is_empty()) {
                ctx.report(Notice::error("empty_file").with("filename", filename));
                continue;
            }

            let mut seen = HashSet::new();
            for name in header.iter().filter(|name| !name.is_empty()) {
                if !seen.insert(name.as_str()) {
                    ctx.report(
                        Notice::error("duplicated_column")
                            .with("filename", filename)
                            .with("fieldName", name.as_str()),
                    );
                }
            }

            for field in kind.required_fields() {
                if !seen.contains(field) {
                    ctx.report(
                        Notice::error("missing_required_column")
                            .with("filename", filename)
                            .with("fieldName", *field),
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::test_utils::{
        context_for, context_over, feed_with, MemorySource, VALID_FEED,
    };
    use crate::validation::ValidationConfig;

    #[test]
    fn test_valid_headers() {
        let ctx = context_for(VALID_FEED);
        RequiredColumnsRule.validate(&ctx).unwrap();
        assert!(ctx.sink.is_empty(), "{:?}", ctx.sink.all());
    }

    #[test]
    fn test_missing_required_column() {
        let ctx = context_for(&feed_with("trips.txt", "route_id,trip_id\nR1,T1\n"));
        RequiredColumnsRule.validate(&ctx).unwrap();

        let notices = ctx.sink.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, "missing_required_column");
        assert_eq!(notices[0].get("filename").unwrap(), "trips.txt");
        assert_eq!(notices[0].get("fieldName").unwrap(), "service_id");
    }

    #[test]
    fn test_duplicated_column() {
        let ctx = context_for(&feed_with(
            "trips.txt",
            "route_id,service_id,trip_id,trip_id\nR1,WK,T1,T1\n",
        ));
        RequiredColumnsRule.validate(&ctx).unwrap();
        assert_eq!(ctx.sink.count_code("duplicated_column"), 1);
        assert_eq!(ctx.sink.count_code("missing_required_column"), 0);
    }

    #[test]
    fn test_empty_file() {
        let ctx = context_for(&feed_with("routes.txt", ""));
        RequiredColumnsRule.validate(&ctx).unwrap();
        assert_eq!(ctx.sink.count_code("empty_file"), 1);
        assert_eq!(ctx.sink.len(), 1);
    }

    #[test]
    fn test_undecodable_header() {
        let source = MemorySource::new(VALID_FEED)
            .with_table_bytes("stops.txt", b"\xffstop_id,stop_name\nS1,First\n");
        let ctx = context_over(source, ValidationConfig::default());
        RequiredColumnsRule.validate(&ctx).unwrap();

        let notices = ctx.sink.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, "csv_parsing_failed");
        assert_eq!(notices[0].get("filename").unwrap(), "stops.txt");
        assert!(ctx.sink.has_errors());
    }

    #[test]
    fn test_unreadable_feed_is_fatal() {
        let source = MemorySource::new(VALID_FEED);
        source.fail_opens(true);
        let ctx = context_over(source, ValidationConfig::default());

        let err = RequiredColumnsRule.validate(&ctx).unwrap_err();
        assert!(err.is_fatal());
        assert!(ctx.sink.is_empty());
    }

    #[test]
    fn test_unknown_files_ignored() {
        let ctx = context_for(&feed_with("notes.txt", "x\n1\n"));
        RequiredColumnsRule.validate(&ctx).unwrap();
        assert!(ctx.sink.is_empty());
    }
}
