use crate::feed::{CacheError, OptionalTable};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// Trips riders cannot take and routes nothing runs on.
pub struct TripUsabilityRule;

impl Rule for TripUsabilityRule {
    fn name(&self) -> &'static str {
        "trip_usability"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        let Some(trips) = ctx.cache.trips().optional()? else {
            return Ok(());
        };

        if let Some(by_trip) = ctx.cache.stop_times_by_trip().optional()? {
            for trip in trips.iter() {
                if by_trip.group_len(&trip.trip_id) < 2 {
                    ctx.report(
                        Notice::warning("unusable_trip")
                            .with("tripId", trip.trip_id.as_str())
                            .with("csvRowNumber", trip.row),
                    );
                }
            }
        }

        if let Some(routes) = ctx.cache.routes().optional()? {
            let by_route = ctx.cache.trips_by_route()?;
            for route in routes.iter() {
                if !by_route.contains_key(&route.route_id) {
                    ctx.report(
                        Notice::warning("route_without_trips")
                            .with("routeId", route.route_id.as_str())
                            .with("csvRowNumber", route.row),
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
    use crate::validation::test_utils::{context_for, feed_with, feed_without, VALID_FEED};
    use serde_json::json;

    #[test]
    fn test_usable_feed() {
        let ctx = context_for(VALID_FEED);
        TripUsabilityRule.validate(&ctx).unwrap();
        assert!(ctx.sink.is_empty());
    }

    #[test]
    fn test_trip_with_single_stop_time() {
        let ctx = context_for(&feed_with(
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,S1,1\n\
             T1,08:10:00,08:10:00,S2,2\n\
             T2,09:00:00,09:00:00,S1,1\n",
        ));
        TripUsabilityRule.validate(&ctx).unwrap();

        let notices = ctx.sink.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, "unusable_trip");
        assert_eq!(notices[0].get("tripId"), Some(&json!("T2")));
        assert!(!ctx.sink.has_errors());
    }

    #[test]
    fn test_route_without_trips() {
        let ctx = context_for(&feed_with(
            "routes.txt",
            "route_id,route_short_name,route_type\nR1,1,3\nR2,2,3\n",
        ));
        TripUsabilityRule.validate(&ctx).unwrap();

        let notices = ctx.sink.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, "route_without_trips");
        assert_eq!(notices[0].get("routeId"), Some(&json!("R2")));
    }

    #[test]
    fn test_missing_routes_still_checks_trips() {
        let mut files = feed_without("routes.txt");
        files.retain(|(name, _)| *name != "stop_times.txt");
        files.push((
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,S1,1\n\
             T1,08:10:00,08:10:00,S2,2\n\
             T2,09:00:00,09:00:00,S1,1\n",
        ));
        let ctx = context_for(&files);
        TripUsabilityRule.validate(&ctx).unwrap();

        let notices = ctx.sink.all();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, "unusable_trip");
        assert_eq!(notices[0].get("tripId"), Some(&json!("T2")));
        assert_eq!(ctx.sink.count_code("route_without_trips"), 0);
    }
}
