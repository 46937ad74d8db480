use std::collections::HashSet;

use crate::feed::{CacheError, OptionalTable, TableKind};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// References between tables that must resolve.
pub struct ForeignKeyRule;

/// One side of a reference: a column in a table.
#[derive(Clone, Copy)]
struct Column {
    table: TableKind,
    field: &'static str,
}

const fn column(table: TableKind, field: &'static str) -> Column {
    Column { table, field }
}

impl Rule for ForeignKeyRule {
    fn name(&self) -> &'static str {
        "foreign_key"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        let cache = &ctx.cache;
        let routes = cache.routes_by_id().optional()?;
        let trips = cache.trips_by_id().optional()?;
        let stops = cache.stops_by_id().optional()?;

        if let (Some(trips), Some(routes)) = (&trips, &routes) {
            check_refs(
                ctx,
                column(TableKind::Trips, "route_id"),
                column(TableKind::Routes, "route_id"),
                trips.rows().iter().map(|t| (t.route_id.as_str(), t.row)),
                |id| routes.contains(id),
            );
        }

        if let Some(trips) = &trips {
            if let Some(services) = service_ids(ctx)? {
                check_refs(
                    ctx,
                    column(TableKind::Trips, "service_id"),
                    column(TableKind::Calendar, "service_id"),
                    trips.rows().iter().map(|t| (t.service_id.as_str(), t.row)),
                    |id| services.contains(id),
                );
            }
        }

        if let Some(stop_times) = cache.stop_times().optional()? {
            if let Some(trips) = &trips {
                check_refs(
                    ctx,
                    column(TableKind::StopTimes, "trip_id"),
                    column(TableKind::Trips, "trip_id"),
                    stop_times.iter().map(|st| (st.trip_id.as_str(), st.row)),
                    |id| trips.contains(id),
                );
            }
            if let Some(stops) = &stops {
                check_refs(
                    ctx,
                    column(TableKind::StopTimes, "stop_id"),
                    column(TableKind::Stops, "stop_id"),
                    stop_times.iter().map(|st| (st.stop_id.as_str(), st.row)),
                    |id| stops.contains(id),
                );
            }
        }

        if let (Some(frequencies), Some(trips)) = (cache.frequencies().optional()?, &trips) {
            check_refs(
                ctx,
                column(TableKind::Frequencies, "trip_id"),
                column(TableKind::Trips, "trip_id"),
                frequencies.iter().map(|f| (f.trip_id.as_str(), f.row)),
                |id| trips.contains(id),
            );
        }

        if let Some(stops) = &stops {
            check_refs(
                ctx,
                column(TableKind::Stops, "parent_station"),
                column(TableKind::Stops, "stop_id"),
                stops
                    .rows()
                    .iter()
                    .filter_map(|s| s.parent_station.as_deref().map(|p| (p, s.row))),
                |id| stops.contains(id),
            );
        }
        Ok(())
    }
}

/// Service IDs defined by calendar.txt or calendar_dates.txt, `None` when
/// neither table is present.
fn service_ids(ctx: &RuleContext) -> Result<Option<HashSet<String>>, CacheError> {
    let calendars = ctx.cache.calendars().optional()?;
    let dates = ctx.cache.calendar_dates_by_service().optional()?;
    if calendars.is_none() && dates.is_none() {
        return Ok(None);
    }

    let mut ids: HashSet<String> = calendars
        .iter()
        .flat_map(|rows| rows.iter().map(|c| c.service_id.clone()))
        .collect();
    if let Some(dates) = dates {
        ids.extend(dates.keys().map(str::to_string));
    }
    Ok(Some(ids))
}

fn check_refs<'a>(
    ctx: &RuleContext,
    child: Column,
    parent: Column,
    refs: impl Iterator<Item = (&'a str, u64)>,
    exists: impl Fn(&str) -> bool,
) {
    for (value, row) in refs {
        if !exists(value) {
            ctx.report(
                Notice::error("foreign_key_violation")
                    .with("childFilename", child.table.file_name())
                    .with("childFieldName", child.field)
                    .with("parentFilename", parent.table.file_name())
                    .with("parentFieldName", parent.field)
                    .with("fieldValue", value)
                    .with("csvRowNumber", row),
            );
        }
    }
}
