//! Feed access: table sources, row streams, typed entities and the shared
//! per-run cache.
//!
//! # Layers
//!
//! - [`TableKind`] - static registry of known tables and their required columns
//! - [`TableSource`] - opens named tables ([`DirectorySource`], [`ArchiveSource`])
//! - [`RecordStream`] - lazy CSV row reader for one table
//! - entities ([`Trip`], [`StopTime`], ...) - typed projections of rows
//! - [`FeedCache`] - parse-once cache of entity lists and derived indexes

mod cache;
mod entities;
mod source;
mod stream;
mod table;

pub use cache::{CacheError, FeedCache, GroupedIndex, KeyedIndex, OptionalTable};
pub use entities::{
    format_date, parse_date, Agency, Calendar, CalendarDate, FromRow, Frequency, GtfsTime,
    ParseError, Route, Stop, StopTime, Trip,
};
pub use source::{open_feed, ArchiveSource, DirectorySource, SourceError, TableSource};
pub use stream::{Header, RecordStream, Row, StreamError};
pub use table::TableKind;
