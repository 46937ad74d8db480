//! Typed GTFS entities and their row parsers.
//!
//! Entities only refer to each other through the string IDs found in the
//! source tables; lookups across tables go through the indexes built by
//! [`FeedCache`](super::FeedCache).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use time::macros::format_description;
use time::Date;

use super::stream::Row;
use super::table::TableKind;

/// Why a row could not be turned into an entity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("row {row}: missing required field {field}")]
    MissingField { row: u64, field: &'static str },
    #[error("row {row}: invalid value '{value}' for {field}")]
    InvalidValue {
        row: u64,
        field: &'static str,
        value: String,
    },
}

/// An entity parsed from one row of its table.
pub trait FromRow: Sized + Send + Sync + 'static {
    /// Table the entity is read from.
    const TABLE: TableKind;

    fn from_row(row: &Row) -> Result<Self, ParseError>;
}

/// A GTFS time of day in seconds since the start of the service day.
///
/// Hours may exceed 23 for trips running past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtfsTime(u32);

impl GtfsTime {
    pub const fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub const fn seconds(self) -> u32 {
        self.0
    }
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,3}):([0-5]\d):([0-5]\d)$").expect("time pattern is valid")
    })
}

impl FromStr for GtfsTime {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = time_pattern().captures(s.trim()).ok_or(())?;
        let part = |idx: usize| -> Result<u32, ()> { caps[idx].parse().map_err(|_| ()) };
        Ok(Self(part(1)? * 3600 + part(2)? * 60 + part(3)?))
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.0 / 3600, (self.0 / 60) % 60, self.0 % 60);
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

/// Parse a `YYYYMMDD` service date.
pub fn parse_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), format_description!("[year][month][day]")).ok()
}

/// Format a date the way GTFS writes it, `YYYYMMDD`.
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year][month][day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Field accessors that attach the row number to every failure.
struct Fields<'a> {
    row: &'a Row,
}

impl<'a> Fields<'a> {
    fn new(row: &'a Row) -> Self {
        Self { row }
    }

    fn raw(&self, field: &'static str) -> Option<&'a str> {
        self.row
            .get(field)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn invalid(&self, field: &'static str, value: &str) -> ParseError {
        ParseError::InvalidValue {
            row: self.row.number(),
            field,
            value: value.to_string(),
        }
    }

    fn required(&self, field: &'static str) -> Result<String, ParseError> {
        self.raw(field)
            .map(str::to_string)
            .ok_or(ParseError::MissingField {
                row: self.row.number(),
                field,
            })
    }

    fn optional(&self, field: &'static str) -> Option<String> {
        self.raw(field).map(str::to_string)
    }

    fn parse<T: FromStr>(&self, field: &'static str) -> Result<Option<T>, ParseError> {
        match self.raw(field) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(field, value)),
        }
    }

    fn parse_required<T: FromStr>(&self, field: &'static str) -> Result<T, ParseError> {
        self.parse(field)?.ok_or(ParseError::MissingField {
            row: self.row.number(),
            field,
        })
    }

    fn date(&self, field: &'static str) -> Result<Date, ParseError> {
        let value = self.required(field)?;
        parse_date(&value).ok_or_else(|| self.invalid(field, &value))
    }

    fn flag(&self, field: &'static str) -> Result<bool, ParseError> {
        match self.raw(field) {
            Some("1") => Ok(true),
            Some("0") => Ok(false),
            Some(other) => Err(self.invalid(field, other)),
            None => Err(ParseError::MissingField {
                row: self.row.number(),
                field,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agency {
    pub row: u64,
    pub agency_id: Option<String>,
    pub name: String,
    pub url: String,
    pub timezone: String,
}

impl FromRow for Agency {
    const TABLE: TableKind = TableKind::Agency;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            agency_id: f.optional("agency_id"),
            name: f.required("agency_name")?,
            url: f.required("agency_url")?,
            timezone: f.required("agency_timezone")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub row: u64,
    pub route_id: String,
    pub agency_id: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub route_type: u16,
}

impl FromRow for Route {
    const TABLE: TableKind = TableKind::Routes;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            route_id: f.required("route_id")?,
            agency_id: f.optional("agency_id"),
            short_name: f.optional("route_short_name"),
            long_name: f.optional("route_long_name"),
            route_type: f.parse_required("route_type")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub row: u64,
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub headsign: Option<String>,
    pub direction_id: Option<u8>,
    pub shape_id: Option<String>,
}

impl FromRow for Trip {
    const TABLE: TableKind = TableKind::Trips;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            route_id: f.required("route_id")?,
            service_id: f.required("service_id")?,
            trip_id: f.required("trip_id")?,
            headsign: f.optional("trip_headsign"),
            direction_id: f.parse("direction_id")?,
            shape_id: f.optional("shape_id"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub row: u64,
    pub stop_id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub location_type: u8,
    pub parent_station: Option<String>,
}

impl FromRow for Stop {
    const TABLE: TableKind = TableKind::Stops;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            stop_id: f.required("stop_id")?,
            name: f.optional("stop_name"),
            lat: f.parse("stop_lat")?,
            lon: f.parse("stop_lon")?,
            location_type: f.parse("location_type")?.unwrap_or(0),
            parent_station: f.optional("parent_station"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTime {
    pub row: u64,
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: Option<GtfsTime>,
    pub departure_time: Option<GtfsTime>,
}

impl FromRow for StopTime {
    const TABLE: TableKind = TableKind::StopTimes;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            trip_id: f.required("trip_id")?,
            stop_id: f.required("stop_id")?,
            stop_sequence: f.parse_required("stop_sequence")?,
            arrival_time: f.parse("arrival_time")?,
            departure_time: f.parse("departure_time")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub row: u64,
    pub service_id: String,
    /// Monday first.
    pub days: [bool; 7],
    pub start_date: Date,
    pub end_date: Date,
}

impl FromRow for Calendar {
    const TABLE: TableKind = TableKind::Calendar;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            service_id: f.required("service_id")?,
            days: [
                f.flag("monday")?,
                f.flag("tuesday")?,
                f.flag("wednesday")?,
                f.flag("thursday")?,
                f.flag("friday")?,
                f.flag("saturday")?,
                f.flag("sunday")?,
            ],
            start_date: f.date("start_date")?,
            end_date: f.date("end_date")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDate {
    pub row: u64,
    pub service_id: String,
    pub date: Date,
    /// 1 = service added, 2 = service removed.
    pub exception_type: u8,
}

impl FromRow for CalendarDate {
    const TABLE: TableKind = TableKind::CalendarDates;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            service_id: f.required("service_id")?,
            date: f.date("date")?,
            exception_type: f.parse_required("exception_type")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frequency {
    pub row: u64,
    pub trip_id: String,
    pub start_time: GtfsTime,
    pub end_time: GtfsTime,
    pub headway_secs: u32,
}

impl FromRow for Frequency {
    const TABLE: TableKind = TableKind::Frequencies;

    fn from_row(row: &Row) -> Result<Self, ParseError> {
        let f = Fields::new(row);
        Ok(Self {
            row: row.number(),
            trip_id: f.required("trip_id")?,
            start_time: f.parse_required("start_time")?,
            end_time: f.parse_required("end_time")?,
            headway_secs: f.parse_required("headway_secs")?,
        })
    }
}
