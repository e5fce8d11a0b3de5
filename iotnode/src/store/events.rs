//! Event tables: scheduled occurrences ordered by start time.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::resources::filename_from_url;
use super::{Database, StoreError};
use crate::time::{format_timestamp, parse_timestamp};

/// What an event plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Cached media identified by its content key.
    WebResource,
    /// Literal text for the marquee.
    Text,
}

impl EventKind {
    /// Persisted integer code, also used as the event store id.
    pub fn code(self) -> u32 {
        match self {
            EventKind::WebResource => 1,
            EventKind::Text => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EventKind::WebResource),
            2 => Some(EventKind::Text),
            _ => None,
        }
    }
}

/// A scheduled occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub eid: i64,
    pub kind: EventKind,
    /// Content key for web-resource events, literal text for text events
    pub resource: String,
    pub start_time: NaiveDateTime,
    pub duration: Option<Duration>,
}

impl Event {
    /// Web-resource event. A URL is reduced to its basename.
    pub fn web_resource(
        eid: i64,
        resource: &str,
        start_time: NaiveDateTime,
        duration: Option<Duration>,
    ) -> Self {
        let resource = filename_from_url(resource).unwrap_or_else(|| resource.to_string());
        Self::new(eid, EventKind::WebResource, resource, start_time, duration)
    }

    pub fn text(
        eid: i64,
        text: impl Into<String>,
        start_time: NaiveDateTime,
        duration: Option<Duration>,
    ) -> Self {
        Self::new(eid, EventKind::Text, text.into(), start_time, duration)
    }

    fn new(
        eid: i64,
        kind: EventKind,
        resource: String,
        start_time: NaiveDateTime,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            eid,
            kind,
            resource,
            start_time,
            duration: duration.filter(|d| !d.is_zero()),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let code: i64 = row.get(1)?;
        let kind =
            EventKind::from_code(code).ok_or(rusqlite::Error::IntegralValueOutOfRange(1, code))?;
        let start: String = row.get(3)?;
        let start_time = parse_timestamp(&start)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let duration: Option<i64> = row.get(4)?;

        Ok(Self {
            eid: row.get(0)?,
            kind,
            resource: row.get(2)?,
            start_time,
            duration: duration
                .filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs as u64)),
        })
    }
}

const COLUMNS: &str = "eid, etype, resource, start_time, duration";

/// Persisted event table `events_<id>`.
pub struct EventStore {
    db: Database,
    table: String,
}

impl EventStore {
    /// Open the table `events_<id>` in `events.db` in the given directory.
    pub fn open(db_dir: &Path, id: u32) -> Result<Self, StoreError> {
        Self::init(Database::open(&db_dir.join("events.db"))?, id)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(id: u32) -> Result<Self, StoreError> {
        Self::init(Database::open_in_memory()?, id)
    }

    fn init(db: Database, id: u32) -> Result<Self, StoreError> {
        let table = format!("events_{id}");
        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    eid INTEGER PRIMARY KEY NOT NULL,
                    etype INTEGER NOT NULL,
                    resource TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    duration INTEGER
                );
                CREATE INDEX IF NOT EXISTS {table}_start ON {table} (start_time);"
            ))
        })?;
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert or replace an event by eid.
    pub fn insert(&self, event: &Event) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(eid) DO UPDATE SET etype = excluded.etype,
                        resource = excluded.resource, start_time = excluded.start_time,
                        duration = excluded.duration",
                    self.table
                ),
                params![
                    event.eid,
                    event.kind.code(),
                    event.resource,
                    format_timestamp(event.start_time),
                    event.duration.map(|d| d.as_secs() as i64),
                ],
            )
        })?;
        Ok(())
    }

    pub fn get(&self, eid: i64) -> Result<Option<Event>, StoreError> {
        self.query_one("WHERE eid = ?1", params![eid])
    }

    /// Returns `false` if no such event exists.
    pub fn remove(&self, eid: i64) -> Result<bool, StoreError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                &format!("DELETE FROM {} WHERE eid = ?1", self.table),
                params![eid],
            )
        })?;
        Ok(changed > 0)
    }

    /// All events ordered by start time.
    pub fn list(&self) -> Result<Vec<Event>, StoreError> {
        self.query_many("", params![])
    }

    /// Events starting at or before `limit`, ordered by start time.
    pub fn until(&self, limit: NaiveDateTime) -> Result<Vec<Event>, StoreError> {
        self.query_many("WHERE start_time <= ?1", params![format_timestamp(limit)])
    }

    /// The most recent event that started at or before `now`.
    pub fn previous(
        &self,
        now: NaiveDateTime,
        resource: Option<&str>,
    ) -> Result<Option<Event>, StoreError> {
        let now = format_timestamp(now);
        match resource {
            Some(resource) => self.query_one(
                "WHERE start_time <= ?1 AND resource = ?2 ORDER BY start_time DESC, eid DESC",
                params![now, resource],
            ),
            None => self.query_one(
                "WHERE start_time <= ?1 ORDER BY start_time DESC, eid DESC",
                params![now],
            ),
        }
    }

    /// The earliest event starting after `now`.
    pub fn next(
        &self,
        now: NaiveDateTime,
        resource: Option<&str>,
    ) -> Result<Option<Event>, StoreError> {
        let now = format_timestamp(now);
        match resource {
            Some(resource) => self.query_one(
                "WHERE start_time > ?1 AND resource = ?2 ORDER BY start_time, eid",
                params![now, resource],
            ),
            None => self.query_one("WHERE start_time > ?1 ORDER BY start_time, eid", params![now]),
        }
    }

    /// The event immediately after `event` in start order.
    pub fn following(&self, event: &Event) -> Result<Option<Event>, StoreError> {
        self.query_one(
            "WHERE start_time > ?1 OR (start_time = ?1 AND eid > ?2) ORDER BY start_time, eid",
            params![format_timestamp(event.start_time), event.eid],
        )
    }

    /// When `resource` is next needed.
    ///
    /// The start of its earliest upcoming event, or if it has none, the start
    /// of its latest past event that has not been pruned yet.
    pub fn next_use(
        &self,
        resource: &str,
        now: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        Ok(match self.next(now, Some(resource))? {
            Some(event) => Some(event.start_time),
            None => self.previous(now, Some(resource))?.map(|e| e.start_time),
        })
    }

    /// Remove and return every event that started before `now`.
    pub fn prune(&self, now: NaiveDateTime) -> Result<Vec<Event>, StoreError> {
        let now = format_timestamp(now);
        let pruned = self.db.with_conn(|conn| {
            let missed = select(conn, &self.table, "WHERE start_time < ?1", params![now])?;
            conn.execute(
                &format!("DELETE FROM {} WHERE start_time < ?1", self.table),
                params![now],
            )?;
            Ok(missed)
        })?;

        for event in &pruned {
            warn!(
                table = %self.table,
                eid = event.eid,
                resource = %event.resource,
                start_time = %event.start_time,
                "Pruning missed event"
            );
        }
        Ok(pruned)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
        })?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Log the whole table in start order.
    pub fn render(&self) -> Result<(), StoreError> {
        let events = self.list()?;
        info!(table = %self.table, count = events.len(), "Event table");
        for event in events {
            info!(
                eid = event.eid,
                kind = ?event.kind,
                resource = %event.resource,
                start_time = %event.start_time,
                duration_secs = event.duration.map(|d| d.as_secs()),
                "Scheduled event"
            );
        }
        Ok(())
    }

    fn query_one(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<Event>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM {} {clause} LIMIT 1", self.table),
                params,
                Event::from_row,
            )
            .optional()
        })
    }

    fn query_many(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Event>, StoreError> {
        self.db
            .with_conn(|conn| select(conn, &self.table, clause, params))
    }
}

fn select(
    conn: &Connection,
    table: &str,
    clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM {table} {clause} ORDER BY start_time, eid"
    ))?;
    let rows = stmt.query_map(params, Event::from_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn at(secs: i64) -> NaiveDateTime {
        t0() + TimeDelta::seconds(secs)
    }

    fn store_with(events: &[Event]) -> EventStore {
        let store = EventStore::open_in_memory(EventKind::WebResource.code()).unwrap();
        for event in events {
            store.insert(event).unwrap();
        }
        store
    }

    #[test]
    fn test_web_resource_normalises_url() {
        let event = Event::web_resource(1, "http://cdn/media/clip.mp4", t0(), None);
        assert_eq!(event.resource, "clip.mp4");

        let event = Event::web_resource(2, "clip.mp4", t0(), Some(Duration::ZERO));
        assert_eq!(event.resource, "clip.mp4");
        assert_eq!(event.duration, None);
    }

    #[test]
    fn test_insert_get_remove() {
        let event = Event::text(7, "Welcome", at(30), Some(Duration::from_secs(15)));
        let store = store_with(&[event.clone()]);

        assert_eq!(store.get(7).unwrap(), Some(event));
        assert!(store.remove(7).unwrap());
        assert_eq!(store.get(7).unwrap(), None);
        assert!(!store.remove(7).unwrap());
    }

    #[test]
    fn test_insert_replaces_by_eid() {
        let store = store_with(&[Event::web_resource(1, "a.mp4", at(10), None)]);
        store
            .insert(&Event::web_resource(1, "b.mp4", at(20), None))
            .unwrap();

        let events = store.list().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource, "b.mp4");
    }

    #[test]
    fn test_list_ordered_by_start() {
        let store = store_with(&[
            Event::web_resource(3, "c.mp4", at(300), None),
            Event::web_resource(1, "a.mp4", at(100), None),
            Event::web_resource(2, "b.mp4", at(200), None),
        ]);

        let eids: Vec<i64> = store.list().unwrap().iter().map(|e| e.eid).collect();
        assert_eq!(eids, vec![1, 2, 3]);

        let eids: Vec<i64> = store.until(at(200)).unwrap().iter().map(|e| e.eid).collect();
        assert_eq!(eids, vec![1, 2]);
    }

    #[test]
    fn test_previous_and_next() {
        let store = store_with(&[
            Event::web_resource(1, "a.mp4", at(-60), None),
            Event::web_resource(2, "b.mp4", at(-2), None),
            Event::web_resource(3, "a.mp4", at(40), None),
            Event::web_resource(4, "b.mp4", at(90), None),
        ]);

        assert_eq!(store.previous(t0(), None).unwrap().unwrap().eid, 2);
        assert_eq!(store.next(t0(), None).unwrap().unwrap().eid, 3);
        assert_eq!(store.previous(t0(), Some("a.mp4")).unwrap().unwrap().eid, 1);
        assert_eq!(store.next(t0(), Some("b.mp4")).unwrap().unwrap().eid, 4);
        assert_eq!(store.next(at(100), None).unwrap(), None);
        assert_eq!(store.previous(at(-100), None).unwrap(), None);
    }

    #[test]
    fn test_event_at_now_is_previous_not_next() {
        let store = store_with(&[Event::web_resource(1, "a.mp4", t0(), None)]);
        assert_eq!(store.previous(t0(), None).unwrap().unwrap().eid, 1);
        assert_eq!(store.next(t0(), None).unwrap(), None);
    }

    #[test]
    fn test_following_breaks_ties_by_eid() {
        let first = Event::web_resource(1, "a.mp4", at(10), None);
        let store = store_with(&[
            first.clone(),
            Event::web_resource(2, "b.mp4", at(10), None),
            Event::web_resource(3, "c.mp4", at(20), None),
        ]);

        let second = store.following(&first).unwrap().unwrap();
        assert_eq!(second.eid, 2);
        assert_eq!(store.following(&second).unwrap().unwrap().eid, 3);
    }

    #[test]
    fn test_next_use_prefers_upcoming_then_past() {
        let store = store_with(&[
            Event::web_resource(1, "a.mp4", at(-600), None),
            Event::web_resource(2, "a.mp4", at(600), None),
            Event::web_resource(3, "b.mp4", at(-30), None),
        ]);

        assert_eq!(store.next_use("a.mp4", t0()).unwrap(), Some(at(600)));
        assert_eq!(store.next_use("b.mp4", t0()).unwrap(), Some(at(-30)));
        assert_eq!(store.next_use("c.mp4", t0()).unwrap(), None);
    }

    #[test]
    fn test_prune_removes_only_past_events() {
        let store = store_with(&[
            Event::web_resource(1, "a.mp4", at(-120), None),
            Event::web_resource(2, "b.mp4", at(-1), None),
            Event::web_resource(3, "c.mp4", t0(), None),
            Event::web_resource(4, "d.mp4", at(60), None),
        ]);

        let pruned: Vec<i64> = store.prune(t0()).unwrap().iter().map(|e| e.eid).collect();
        assert_eq!(pruned, vec![1, 2]);

        let remaining: Vec<i64> = store.list().unwrap().iter().map(|e| e.eid).collect();
        assert_eq!(remaining, vec![3, 4]);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_tables_are_independent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let media = EventStore::open(temp_dir.path(), EventKind::WebResource.code()).unwrap();
        let text = EventStore::open(temp_dir.path(), EventKind::Text.code()).unwrap();

        media.insert(&Event::web_resource(1, "a.mp4", t0(), None)).unwrap();
        text.insert(&Event::text(1, "Hello", t0(), None)).unwrap();

        assert_eq!(media.table(), "events_1");
        assert_eq!(text.table(), "events_2");
        assert_eq!(media.get(1).unwrap().unwrap().kind, EventKind::WebResource);
        assert_eq!(text.get(1).unwrap().unwrap().resource, "Hello");
    }

    #[test]
    fn test_render_on_empty_table() {
        let store = store_with(&[]);
        assert!(store.is_empty().unwrap());
        store.render().unwrap();
    }
}
