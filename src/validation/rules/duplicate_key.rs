use std::collections::HashMap;

use crate::feed::{CacheError, OptionalTable, TableKind};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// IDs that must be unique within their table.
pub struct DuplicateKeyRule;

impl Rule for DuplicateKeyRule {
    fn name(&self) -> &'static str {
        "duplicate_key"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        if let Some(agencies) = ctx.cache.agencies().optional()? {
            let keys = agencies
                .iter()
                .filter_map(|a| a.agency_id.as_deref().map(|id| (id, a.row)));
            check_unique(ctx, TableKind::Agency, "agency_id", keys);
        }
        if let Some(stops) = ctx.cache.stops().optional()? {
            let keys = stops.iter().map(|s| (s.stop_id.as_str(), s.row));
            check_unique(ctx, TableKind::Stops, "stop_id", keys);
        }
        if let Some(routes) = ctx.cache.routes().optional()? {
            let keys = routes.iter().map(|r| (r.route_id.as_str(), r.row));
            check_unique(ctx, TableKind::Routes, "route_id", keys);
        }
        if let Some(trips) = ctx.cache.trips().optional()? {
            let keys = trips.iter().map(|t| (t.trip_id.as_str(), t.row));
            check_unique(ctx, TableKind::Trips, "trip_id", keys);
        }
        Ok(())
    }
}

/// Report every repeat of a key, pointing back at its first row.
fn check_unique<'a>(
    ctx: &RuleContext,
    table: TableKind,
    field: &'static str,
    keys: impl Iterator<Item = (&'a str, u64)>,
) {
    let mut first_rows: HashMap<&str, u64> = HashMap::new();
    for (key, row) in keys {
        match first_rows.get(key) {
            Some(&old_row) => ctx.report(
                Notice::error("duplicate_key")
                    .with("filename", table.file_name())
                    .with("fieldName", field)
                    .with("fieldValue", key)
                    .with("oldCsvRowNumber", old_row)
                    .with("newCsvRowNumber", row),
            ),
            None => {
                first_rows.insert(key, row);
            }
        }
    }
}
