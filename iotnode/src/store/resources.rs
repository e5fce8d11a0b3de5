//! Resource table: content key → origin URL and lifecycle tag.

use std::path::Path;

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{Database, StoreError};

/// Lifecycle tag of a resource.
///
/// Assets are long-lived (logos, backgrounds) and never chosen by an
/// eviction policy. Content is scheduled media and may be evicted.
/// A resource without a kind is orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Asset,
    Content,
}

impl ResourceKind {
    /// Persisted integer code.
    pub fn code(self) -> i64 {
        match self {
            ResourceKind::Asset => 1,
            ResourceKind::Content => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ResourceKind::Asset),
            2 => Some(ResourceKind::Content),
            _ => None,
        }
    }
}

/// A row of the resource table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub filename: String,
    pub url: Option<String>,
    pub kind: Option<ResourceKind>,
}

impl Resource {
    pub fn new(
        filename: impl Into<String>,
        url: Option<String>,
        kind: Option<ResourceKind>,
    ) -> Self {
        Self {
            filename: filename.into(),
            url,
            kind,
        }
    }

    /// Content resource keyed by the basename of its URL.
    ///
    /// Returns `None` when the URL has no usable basename.
    pub fn content_from_url(url: &str) -> Option<Self> {
        let filename = filename_from_url(url)?;
        Some(Self::new(filename, Some(url.to_string()), Some(ResourceKind::Content)))
    }

    pub fn is_orphaned(&self) -> bool {
        self.kind.is_none()
    }

    pub fn is_content(&self) -> bool {
        self.kind == Some(ResourceKind::Content)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let filename: String = row.get(0)?;
        let code: Option<i64> = row.get(2)?;
        let kind = code.and_then(|c| {
            let kind = ResourceKind::from_code(c);
            if kind.is_none() {
                warn!(key = %filename, rtype = c, "Unknown resource type, treating as orphaned");
            }
            kind
        });
        Ok(Self {
            filename,
            url: row.get(1)?,
            kind,
        })
    }
}

/// Derive a content key from a URL: the last non-empty path segment.
///
/// Strings that do not parse as URLs are treated as plain paths.
pub fn filename_from_url(url: &str) -> Option<String> {
    let basename = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(|s| s.to_string()),
    };
    basename.filter(|name| name != "." && name != "..")
}

/// Persisted resource table.
pub struct ResourceStore {
    db: Database,
}

impl ResourceStore {
    /// Open `resources.db` in the given directory.
    pub fn open(db_dir: &Path) -> Result<Self, StoreError> {
        Self::init(Database::open(&db_dir.join("resources.db"))?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Database::open_in_memory()?)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS resources (
                    filename TEXT PRIMARY KEY NOT NULL,
                    url TEXT,
                    rtype INTEGER
                );",
            )
        })?;
        Ok(Self { db })
    }

    pub fn get(&self, filename: &str) -> Result<Option<Resource>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT filename, url, rtype FROM resources WHERE filename = ?1",
                params![filename],
                Resource::from_row,
            )
            .optional()
        })
    }

    pub fn has(&self, filename: &str) -> Result<bool, StoreError> {
        Ok(self.get(filename)?.is_some())
    }

    /// Insert or replace a resource row.
    pub fn upsert(&self, resource: &Resource) -> Result<(), StoreError> {
        debug!(key = %resource.filename, kind = ?resource.kind, "Upserting resource");
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO resources (filename, url, rtype) VALUES (?1, ?2, ?3)
                 ON CONFLICT(filename) DO UPDATE SET url = excluded.url, rtype = excluded.rtype",
                params![
                    resource.filename,
                    resource.url,
                    resource.kind.map(ResourceKind::code)
                ],
            )
        })?;
        Ok(())
    }

    /// Insert or replace a resource from its parts.
    pub fn insert(
        &self,
        filename: &str,
        url: Option<&str>,
        kind: ResourceKind,
    ) -> Result<Resource, StoreError> {
        let resource = Resource::new(filename, url.map(str::to_string), Some(kind));
        self.upsert(&resource)?;
        Ok(resource)
    }

    /// Clear the lifecycle tag, making the resource eligible for deletion.
    ///
    /// Returns `false` if no such resource exists.
    pub fn orphan(&self, filename: &str) -> Result<bool, StoreError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE resources SET rtype = NULL WHERE filename = ?1",
                params![filename],
            )
        })?;
        Ok(changed > 0)
    }

    /// Returns `false` if no such resource exists.
    pub fn remove(&self, filename: &str) -> Result<bool, StoreError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM resources WHERE filename = ?1", params![filename])
        })?;
        Ok(changed > 0)
    }

    /// All resources, ordered by filename.
    pub fn list(&self) -> Result<Vec<Resource>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT filename, url, rtype FROM resources ORDER BY filename")?;
            let rows = stmt.query_map([], Resource::from_row)?;
            rows.collect()
        })
    }
}
