//! Built-in validation rules.
//!
//! Each rule is a unit struct implementing [`Rule`]. Rules read the feed
//! through the shared cache, report through the sink, and treat an absent
//! table as "nothing to check".

mod duplicate_key;
mod foreign_key;
mod missing_files;
mod required_columns;
mod route_name;
mod service_date;
mod stop_time_sequence;
mod trip_usability;

pub use duplicate_key::DuplicateKeyRule;
pub use foreign_key::ForeignKeyRule;
pub use missing_files::MissingFilesRule;
pub use required_columns::RequiredColumnsRule;
pub use route_name::RouteNameRule;
pub use service_date::ServiceDateRule;
pub use stop_time_sequence::StopTimeSequenceRule;
pub use trip_usability::TripUsabilityRule;

use super::runner::Rule;

/// Every built-in rule, file-level checks first.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(MissingFilesRule),
        Box::new(RequiredColumnsRule),
        Box::new(DuplicateKeyRule),
        Box::new(ForeignKeyRule),
        Box::new(RouteNameRule),
        Box::new(StopTimeSequenceRule),
        Box::new(TripUsabilityRule),
        Box::new(ServiceDateRule),
    ]
}
