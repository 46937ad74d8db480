use std::sync::Arc;

use anyhow::ensure;
use tracing::debug;

use crate::feed::{CacheError, GtfsTime, OptionalTable, StopTime};
use crate::validation::notice::Notice;
use crate::validation::pool::for_each_bounded;
use crate::validation::runner::{Rule, RuleContext};

/// Arrival and departure times along each trip.
///
/// Trips are independent, so they are checked on the worker pool. The
/// grouped stop_times index and the trip index are built before the fan-out;
/// workers only read them.
pub struct StopTimeSequenceRule;

impl Rule for StopTimeSequenceRule {
    fn name(&self) -> &'static str {
        "stop_time_sequence"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        let Some(by_trip) = ctx.cache.stop_times_by_trip().optional()? else {
            return Ok(());
        };
        let trips = ctx.cache.trips_by_id().optional()?;

        let trip_ids: Vec<String> = by_trip.keys().map(str::to_string).collect();
        debug!(trips = trip_ids.len(), "checking stop time sequences");

        let sink = Arc::clone(&ctx.sink);
        let outcome = for_each_bounded(&ctx.config, trip_ids, move |trip_id: String| {
            let notices = check_trip(&trip_id, by_trip.get(&trip_id))?;
            let route_id = trips
                .as_ref()
                .and_then(|index| index.get(&trip_id))
                .map(|trip| trip.route_id.clone());
            sink.extend(notices.into_iter().map(|notice| match &route_id {
                Some(route_id) => notice.with("routeId", route_id.as_str()),
                None => notice,
            }));
            Ok(())
        });

        if outcome.failed > 0 {
            ctx.report(
                Notice::error("runtime_exception_in_validator")
                    .with("validator", self.name())
                    .with("failedTasks", outcome.failed),
            );
        }
        Ok(())
    }
}

/// Check one trip's stop times, given in any order.
fn check_trip(trip_id: &str, mut stop_times: Vec<&StopTime>) -> anyhow::Result<Vec<Notice>> {
    ensure!(!stop_times.is_empty(), "trip {trip_id} has no stop times");
    stop_times.sort_by_key(|st| st.stop_sequence);

    let mut notices = Vec::new();
    let at = |code: &str, st: &StopTime| {
        Notice::error(code)
            .with("tripId", trip_id)
            .with("stopSequence", st.stop_sequence)
            .with("csvRowNumber", st.row)
    };

    for pair in stop_times.windows(2) {
        if pair[0].stop_sequence == pair[1].stop_sequence {
            notices.push(
                at("duplicate_stop_sequence", pair[1]).with("prevCsvRowNumber", pair[0].row),
            );
        }
    }

    let first = stop_times[0];
    let last = stop_times[stop_times.len() - 1];
    for edge in [first, last] {
        if edge.arrival_time.is_none() && edge.departure_time.is_none() {
            notices.push(at("missing_trip_edge", edge));
        }
        if stop_times.len() == 1 {
            break;
        }
    }

    let mut previous: Option<(GtfsTime, &StopTime)> = None;
    for &st in &stop_times {
        if let (Some(arrival), Some(departure)) = (st.arrival_time, st.departure_time) {
            if departure < arrival {
                notices.push(
                    at("stop_time_with_departure_before_arrival_time", st)
                        .with("arrivalTime", arrival.to_string())
                        .with("departureTime", departure.to_string()),
                );
            }
        }

        if let (Some(arrival), Some((prev_departure, prev))) =
            (st.arrival_time.or(st.departure_time), previous)
        {
            if arrival < prev_departure {
                notices.push(
                    at("stop_time_with_arrival_before_previous_departure_time", st)
                        .with("prevCsvRowNumber", prev.row)
                        .with("arrivalTime", arrival.to_string())
                        .with("departureTime", prev_departure.to_string()),
                );
            }
        }

        if let Some(departure) = st.departure_time.or(st.arrival_time) {
            previous = Some((departure, st));
        }
    }

    Ok(notices)
}
