//! Static registry of the GTFS tables this crate knows about.
//!
//! Each [`TableKind`] maps to its file name inside a feed and the set of
//! columns a conforming file must carry. Rules that need "which fields does
//! this file require" resolve it here instead of keeping their own lookup
//! tables.

use std::fmt;

/// A recognized GTFS table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Agency,
    Stops,
    Routes,
    Trips,
    StopTimes,
    Calendar,
    CalendarDates,
    Frequencies,
    Shapes,
    Transfers,
    FeedInfo,
}

impl TableKind {
    /// Every table kind, in the order rules report them.
    pub const ALL: [TableKind; 11] = [
        TableKind::Agency,
        TableKind::Stops,
        TableKind::Routes,
        TableKind::Trips,
        TableKind::StopTimes,
        TableKind::Calendar,
        TableKind::CalendarDates,
        TableKind::Frequencies,
        TableKind::Shapes,
        TableKind::Transfers,
        TableKind::FeedInfo,
    ];

    /// File name of the table inside a feed (e.g. `trips.txt`).
    pub const fn file_name(self) -> &'static str {
        match self {
            TableKind::Agency => "agency.txt",
            TableKind::Stops => "stops.txt",
            TableKind::Routes => "routes.txt",
            TableKind::Trips => "trips.txt",
            TableKind::StopTimes => "stop_times.txt",
            TableKind::Calendar => "calendar.txt",
            TableKind::CalendarDates => "calendar_dates.txt",
            TableKind::Frequencies => "frequencies.txt",
            TableKind::Shapes => "shapes.txt",
            TableKind::Transfers => "transfers.txt",
            TableKind::FeedInfo => "feed_info.txt",
        }
    }

    /// Columns that must be present in the table header.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            TableKind::Agency => &["agency_name", "agency_url", "agency_timezone"],
            TableKind::Stops => &["stop_id"],
            TableKind::Routes => &["route_id", "route_type"],
            TableKind::Trips => &["route_id", "service_id", "trip_id"],
            TableKind::StopTimes => &["trip_id", "stop_id", "stop_sequence"],
            TableKind::Calendar => &[
                "service_id",
                "monday",
                "tuesday",
                "wednesday",
                "thursday",
                "friday",
                "saturday",
                "sunday",
                "start_date",
                "end_date",
            ],
            TableKind::CalendarDates => &["service_id", "date", "exception_type"],
            TableKind::Frequencies => &["trip_id", "start_time", "end_time", "headway_secs"],
            TableKind::Shapes => &[
                "shape_id",
                "shape_pt_lat",
                "shape_pt_lon",
                "shape_pt_sequence",
            ],
            TableKind::Transfers => &["from_stop_id", "to_stop_id", "transfer_type"],
            TableKind::FeedInfo => &[
                "feed_publisher_name",
                "feed_publisher_url",
                "feed_lang",
            ],
        }
    }

    /// Whether every feed must contain this table.
    ///
    /// `calendar.txt` and `calendar_dates.txt` are conditionally required (at
    /// least one of them), which is checked separately.
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            TableKind::Agency
                | TableKind::Stops
                | TableKind::Routes
                | TableKind::Trips
                | TableKind::StopTimes
        )
    }

    /// Resolve a file name back to its table kind.
    pub fn from_file_name(name: &str) -> Option<TableKind> {
        TableKind::ALL
            .into_iter()
            .find(|kind| kind.file_name() == name)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}
