//! Shared, lazily populated view of one feed.
//!
//! `FeedCache` sits between a [`TableSource`] and the rules. Every accessor
//! parses its backing table on first use and hands out the same `Arc` to every
//! later caller, from any thread. Derived indexes (by-ID maps, grouped-by-key
//! maps) are separate cache entries built from a complete snapshot of the
//! entity list they index.
//!
//! # Locking
//!
//! All entries live behind a single `RwLock`. Accessors first look the entry up
//! under the read lock; on a miss they take the write lock and check again
//! before loading, since another caller may have loaded the entry between the
//! two locks. The entry is only published once the value is fully built, so
//! no caller observes a partial table.
//!
//! Index builders obtain their backing entity list *before* taking the write
//! lock. The lock is never re-entered by the thread holding it.
//!
//! # Missing tables
//!
//! A table the source reports as absent is remembered as absent until
//! [`FeedCache::clear`]; other failures are not cached and the next call
//! retries the load.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace};

use super::entities::{
    Agency, Calendar, CalendarDate, FromRow, Frequency, Route, Stop, StopTime, Trip,
};
use super::source::{SourceError, TableSource};
use super::stream::StreamError;
use super::table::TableKind;

/// Errors returned by cache accessors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The table is not part of the feed.
    #[error("{table} is missing from the feed")]
    MissingTable { table: TableKind },
    /// The table exists but its header could not be decoded.
    #[error("{table} could not be read: {message}")]
    InvalidTable { table: TableKind, message: String },
    /// The feed itself could not be read.
    #[error(transparent)]
    Source(SourceError),
    /// Reading a table failed part-way through.
    #[error(transparent)]
    Stream(StreamError),
}

impl CacheError {
    pub fn is_missing(&self) -> bool {
        matches!(self, CacheError::MissingTable { .. })
    }

    /// Whether the error should abort the whole validation run rather than
    /// just the rule that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::Source(_) | CacheError::Stream(_))
    }
}

/// Turns "table unavailable" into `None` while still propagating failures of
/// the feed itself.
pub trait OptionalTable<T> {
    fn optional(self) -> Result<Option<T>, CacheError>;
}

impl<T> OptionalTable<T> for Result<T, CacheError> {
    fn optional(self) -> Result<Option<T>, CacheError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(error = %err, "table unavailable");
                Ok(None)
            }
        }
    }
}

/// Unique-key index over an entity list. The first row with a given key wins.
#[derive(Debug)]
pub struct KeyedIndex<T> {
    rows: Arc<Vec<T>>,
    positions: HashMap<String, usize>,
}

impl<T> KeyedIndex<T> {
    fn build(rows: Arc<Vec<T>>, key: fn(&T) -> &str) -> Self {
        let mut positions = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            positions.entry(key(row).to_string()).or_insert(idx);
        }
        Self { rows, positions }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.positions.get(key).map(|&idx| &self.rows[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The entity list the index was built from.
    pub fn rows(&self) -> &Arc<Vec<T>> {
        &self.rows
    }
}

/// Index grouping an entity list by a foreign key. Rows inside a group keep
/// their source order; groups are ordered by first appearance.
#[derive(Debug)]
pub struct GroupedIndex<T> {
    rows: Arc<Vec<T>>,
    groups: HashMap<String, Vec<usize>>,
    order: Vec<String>,
}

impl<T> GroupedIndex<T> {
    fn build(rows: Arc<Vec<T>>, key: fn(&T) -> &str) -> Self {
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let group = key(row);
            match groups.get_mut(group) {
                Some(members) => members.push(idx),
                None => {
                    order.push(group.to_string());
                    groups.insert(group.to_string(), vec![idx]);
                }
            }
        }
        Self {
            rows,
            groups,
            order,
        }
    }

    /// Members of one group, in source order. Empty when the key is unknown.
    pub fn get(&self, key: &str) -> Vec<&T> {
        self.groups
            .get(key)
            .map(|members| members.iter().map(|&idx| &self.rows[idx]).collect())
            .unwrap_or_default()
    }

    pub fn group_len(&self, key: &str) -> usize {
        self.groups.get(key).map_or(0, Vec::len)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }

    /// Group keys in order of first appearance.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<&T>)> {
        self.keys().map(move |key| (key, self.get(key)))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn rows(&self) -> &Arc<Vec<T>> {
        &self.rows
    }
}

enum Slot<T> {
    Empty,
    Loaded(Arc<T>),
    Absent(TableKind),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Empty
    }
}

impl<T> Slot<T> {
    fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded(_))
    }

    fn hit(&self) -> Option<Result<Arc<T>, CacheError>> {
        match self {
            Slot::Empty => None,
            Slot::Loaded(value) => Some(Ok(Arc::clone(value))),
            Slot::Absent(table) => Some(Err(CacheError::MissingTable { table: *table })),
        }
    }
}

#[derive(Default)]
struct CacheState {
    agencies: Slot<Vec<Agency>>,
    routes: Slot<Vec<Route>>,
    trips: Slot<Vec<Trip>>,
    stops: Slot<Vec<Stop>>,
    stop_times: Slot<Vec<StopTime>>,
    calendars: Slot<Vec<Calendar>>,
    calendar_dates: Slot<Vec<CalendarDate>>,
    frequencies: Slot<Vec<Frequency>>,

    routes_by_id: Slot<KeyedIndex<Route>>,
    trips_by_id: Slot<KeyedIndex<Trip>>,
    stops_by_id: Slot<KeyedIndex<Stop>>,

    trips_by_route: Slot<GroupedIndex<Trip>>,
    stop_times_by_trip: Slot<GroupedIndex<StopTime>>,
    calendar_dates_by_service: Slot<GroupedIndex<CalendarDate>>,
    frequencies_by_trip: Slot<GroupedIndex<Frequency>>,
}

impl CacheState {
    fn loaded_keys(&self) -> Vec<&'static str> {
        [
            ("agencies", self.agencies.is_loaded()),
            ("routes", self.routes.is_loaded()),
            ("trips", self.trips.is_loaded()),
            ("stops", self.stops.is_loaded()),
            ("stop_times", self.stop_times.is_loaded()),
            ("calendars", self.calendars.is_loaded()),
            ("calendar_dates", self.calendar_dates.is_loaded()),
            ("frequencies", self.frequencies.is_loaded()),
            ("routes-by-id", self.routes_by_id.is_loaded()),
            ("trips-by-id", self.trips_by_id.is_loaded()),
            ("stops-by-id", self.stops_by_id.is_loaded()),
            ("trips-by-route", self.trips_by_route.is_loaded()),
            ("stop_times-by-trip", self.stop_times_by_trip.is_loaded()),
            (
                "calendar_dates-by-service",
                self.calendar_dates_by_service.is_loaded(),
            ),
            ("frequencies-by-trip", self.frequencies_by_trip.is_loaded()),
        ]
        .into_iter()
        .filter_map(|(key, loaded)| loaded.then_some(key))
        .collect()
    }
}

type Select<T> = fn(&CacheState) -> &Slot<T>;
type SelectMut<T> = fn(&mut CacheState) -> &mut Slot<T>;

/// Per-run cache of parsed tables and derived indexes.
pub struct FeedCache {
    source: Arc<dyn TableSource>,
    state: RwLock<CacheState>,
}

impl FeedCache {
    pub fn new(source: Arc<dyn TableSource>) -> Self {
        Self {
            source,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// The underlying source, for tables without a typed accessor.
    pub fn source(&self) -> Arc<dyn TableSource> {
        Arc::clone(&self.source)
    }

    /// Drop every cached table and index. The next accessor call reloads.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = CacheState::default();
    }

    /// Keys of the entries currently materialized.
    pub fn loaded_keys(&self) -> Vec<&'static str> {
        self.state.read().loaded_keys()
    }

    // === Entity lists ===

    pub fn agencies(&self) -> Result<Arc<Vec<Agency>>, CacheError> {
        self.entities("agencies", |s| &s.agencies, |s| &mut s.agencies)
    }

    pub fn routes(&self) -> Result<Arc<Vec<Route>>, CacheError> {
        self.entities("routes", |s| &s.routes, |s| &mut s.routes)
    }

    pub fn trips(&self) -> Result<Arc<Vec<Trip>>, CacheError> {
        self.entities("trips", |s| &s.trips, |s| &mut s.trips)
    }

    pub fn stops(&self) -> Result<Arc<Vec<Stop>>, CacheError> {
        self.entities("stops", |s| &s.stops, |s| &mut s.stops)
    }

    pub fn stop_times(&self) -> Result<Arc<Vec<StopTime>>, CacheError> {
        self.entities("stop_times", |s| &s.stop_times, |s| &mut s.stop_times)
    }

    pub fn calendars(&self) -> Result<Arc<Vec<Calendar>>, CacheError> {
        self.entities("calendars", |s| &s.calendars, |s| &mut s.calendars)
    }

    pub fn calendar_dates(&self) -> Result<Arc<Vec<CalendarDate>>, CacheError> {
        self.entities(
            "calendar_dates",
            |s| &s.calendar_dates,
            |s| &mut s.calendar_dates,
        )
    }

    pub fn frequencies(&self) -> Result<Arc<Vec<Frequency>>, CacheError> {
        self.entities("frequencies", |s| &s.frequencies, |s| &mut s.frequencies)
    }

    // === By-ID indexes ===

    pub fn routes_by_id(&self) -> Result<Arc<KeyedIndex<Route>>, CacheError> {
        self.index(
            "routes-by-id",
            |s| &s.routes_by_id,
            |s| &mut s.routes_by_id,
            || self.routes(),
            |rows| KeyedIndex::build(rows, |r| r.route_id.as_str()),
        )
    }

    pub fn trips_by_id(&self) -> Result<Arc<KeyedIndex<Trip>>, CacheError> {
        self.index(
            "trips-by-id",
            |s| &s.trips_by_id,
            |s| &mut s.trips_by_id,
            || self.trips(),
            |rows| KeyedIndex::build(rows, |t| t.trip_id.as_str()),
        )
    }

    pub fn stops_by_id(&self) -> Result<Arc<KeyedIndex<Stop>>, CacheError> {
        self.index(
            "stops-by-id",
            |s| &s.stops_by_id,
            |s| &mut s.stops_by_id,
            || self.stops(),
            |rows| KeyedIndex::build(rows, |s| s.stop_id.as_str()),
        )
    }

    /// Look up one route. Misses, including a missing routes table, are `None`.
    pub fn route_by_id(&self, route_id: &str) -> Option<Route> {
        self.routes_by_id().ok()?.get(route_id).cloned()
    }

    pub fn trip_by_id(&self, trip_id: &str) -> Option<Trip> {
        self.trips_by_id().ok()?.get(trip_id).cloned()
    }

    pub fn stop_by_id(&self, stop_id: &str) -> Option<Stop> {
        self.stops_by_id().ok()?.get(stop_id).cloned()
    }

    // === Grouped indexes ===

    pub fn trips_by_route(&self) -> Result<Arc<GroupedIndex<Trip>>, CacheError> {
        self.index(
            "trips-by-route",
            |s| &s.trips_by_route,
            |s| &mut s.trips_by_route,
            || self.trips(),
            |rows| GroupedIndex::build(rows, |t| t.route_id.as_str()),
        )
    }

    pub fn stop_times_by_trip(&self) -> Result<Arc<GroupedIndex<StopTime>>, CacheError> {
        self.index(
            "stop_times-by-trip",
            |s| &s.stop_times_by_trip,
            |s| &mut s.stop_times_by_trip,
            || self.stop_times(),
            |rows| GroupedIndex::build(rows, |st| st.trip_id.as_str()),
        )
    }

    pub fn calendar_dates_by_service(
        &self,
    ) -> Result<Arc<GroupedIndex<CalendarDate>>, CacheError> {
        self.index(
            "calendar_dates-by-service",
            |s| &s.calendar_dates_by_service,
            |s| &mut s.calendar_dates_by_service,
            || self.calendar_dates(),
            |rows| GroupedIndex::build(rows, |cd| cd.service_id.as_str()),
        )
    }

    pub fn frequencies_by_trip(&self) -> Result<Arc<GroupedIndex<Frequency>>, CacheError> {
        self.index(
            "frequencies-by-trip",
            |s| &s.frequencies_by_trip,
            |s| &mut s.frequencies_by_trip,
            || self.frequencies(),
            |rows| GroupedIndex::build(rows, |f| f.trip_id.as_str()),
        )
    }

    // === Loading ===

    fn entities<E: FromRow>(
        &self,
        key: &'static str,
        get: Select<Vec<E>>,
        get_mut: SelectMut<Vec<E>>,
    ) -> Result<Arc<Vec<E>>, CacheError> {
        if let Some(hit) = self.lookup(get) {
            return hit;
        }
        self.fill(key, get_mut, || self.load_table::<E>())
    }

    fn index<E, I>(
        &self,
        key: &'static str,
        get: Select<I>,
        get_mut: SelectMut<I>,
        backing: impl FnOnce() -> Result<Arc<Vec<E>>, CacheError>,
        build: impl FnOnce(Arc<Vec<E>>) -> I,
    ) -> Result<Arc<I>, CacheError> {
        if let Some(hit) = self.lookup(get) {
            return hit;
        }
        // The snapshot is complete: entity lists are only published fully built.
        let rows = backing()?;
        self.fill(key, get_mut, || Ok(build(rows)))
    }

    /// Fast path under the read lock.
    fn lookup<T>(&self, get: Select<T>) -> Option<Result<Arc<T>, CacheError>> {
        get(&self.state.read()).hit()
    }

    /// Slow path: re-check under the write lock, then build and publish.
    fn fill<T>(
        &self,
        key: &'static str,
        get_mut: SelectMut<T>,
        build: impl FnOnce() -> Result<T, CacheError>,
    ) -> Result<Arc<T>, CacheError> {
        let mut state = self.state.write();
        let slot = get_mut(&mut state);
        if let Some(hit) = slot.hit() {
            return hit;
        }

        match build() {
            Ok(value) => {
                let value = Arc::new(value);
                *slot = Slot::Loaded(Arc::clone(&value));
                debug!(key, "cache entry built");
                Ok(value)
            }
            Err(CacheError::MissingTable { table }) => {
                *slot = Slot::Absent(table);
                debug!(key, %table, "table absent");
                Err(CacheError::MissingTable { table })
            }
            Err(err) => Err(err),
        }
    }

    /// Parse every row of `E::TABLE`, skipping rows that do not parse.
    fn load_table<E: FromRow>(&self) -> Result<Vec<E>, CacheError> {
        let table = E::TABLE;
        let stream = match self.source.open(table.file_name()) {
            Ok(stream) => stream,
            Err(SourceError::NotFound(_)) => return Err(CacheError::MissingTable { table }),
            Err(SourceError::InvalidTable { message, .. }) => {
                return Err(CacheError::InvalidTable { table, message })
            }
            Err(err) => return Err(CacheError::Source(err)),
        };

        let mut entities = Vec::new();
        let mut skipped = 0usize;
        for row in stream {
            let row = match row {
                Ok(row) => row,
                Err(err @ StreamError::Malformed { .. }) => {
                    trace!(error = %err, "skipping malformed row");
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(CacheError::Stream(err)),
            };
            match E::from_row(&row) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    trace!(%table, error = %err, "skipping unparsable row");
                    skipped += 1;
                }
            }
        }

        debug!(%table, rows = entities.len(), skipped, "table loaded");
        Ok(entities)
    }
}
