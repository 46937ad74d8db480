use crate::feed::{CacheError, OptionalTable, Route};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// Routes must be nameable by riders.
pub struct RouteNameRule;

impl Rule for RouteNameRule {
    fn name(&self) -> &'static str {
        "route_name"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        let Some(routes) = ctx.cache.routes().optional()? else {
            return Ok(());
        };

        for route in routes.iter() {
            match (&route.short_name, &route.long_name) {
                (None, None) => ctx.report(
                    located(Notice::error("route_both_short_and_long_name_missing"), route),
                ),
                (Some(short), Some(long)) if short.eq_ignore_ascii_case(long) => ctx.report(
                    located(Notice::warning("same_name_and_description_for_route"), route)
                        .with("routeShortName", short.as_str()),
                ),
                _ => {}
            }
        }
        Ok(())
    }
}

fn located(notice: Notice, route: &Route) -> Notice {
    notice
        .with("routeId", route.route_id.as_str())
        .with("csvRowNumber", route.row)
}
