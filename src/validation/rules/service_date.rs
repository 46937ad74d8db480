use time::Date;

use crate::feed::{format_date, CacheError, OptionalTable};
use crate::validation::notice::Notice;
use crate::validation::runner::{Rule, RuleContext};

/// calendar_dates.txt exception type for a date on which service is added.
const SERVICE_ADDED: u8 = 1;

/// Service periods: well-formed ranges, and at least one still running.
pub struct ServiceDateRule;

impl Rule for ServiceDateRule {
    fn name(&self) -> &'static str {
        "service_date"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), CacheError> {
        let calendars = ctx.cache.calendars().optional()?;
        let by_service = ctx.cache.calendar_dates_by_service().optional()?;
        if calendars.is_none() && by_service.is_none() {
            return Ok(());
        }

        let mut latest: Option<Date> = None;
        for calendar in calendars.iter().flat_map(|rows| rows.iter()) {
            if calendar.end_date < calendar.start_date {
                ctx.report(
                    Notice::error("start_and_end_range_out_of_order")
                        .with("filename", "calendar.txt")
                        .with("serviceId", calendar.service_id.as_str())
                        .with("csvRowNumber", calendar.row)
                        .with("startDate", format_date(calendar.start_date))
                        .with("endDate", format_date(calendar.end_date)),
                );
                continue;
            }
            latest = latest.max(Some(calendar.end_date));
        }

        if let Some(by_service) = &by_service {
            let added = by_service
                .rows()
                .iter()
                .filter(|cd| cd.exception_type == SERVICE_ADDED)
                .map(|cd| cd.date);
            latest = latest.max(added.max());
        }

        let today = ctx.config.current_date;
        if let Some(latest) = latest.filter(|&date| date < today) {
            ctx.report(
                Notice::warning("expired_calendar")
                    .with("latestServiceDate", format_date(latest))
                    .with("currentDate", format_date(today)),
            );
        }
        Ok(())
    }
}
