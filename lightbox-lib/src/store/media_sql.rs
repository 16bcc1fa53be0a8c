use const_format::formatcp;
use rusqlite::{named_params, Connection, Error, Row};

use crate::media::{dedup_tags, MediaRecord};

use super::converters::{OrientationSql, PathBufSql, TagsSql};

const READ_COLUMNS: &str = "m.filepath, m.taken_at, s.name, m.orientation, \
    mk.name, md.name, m.thumbnail, m.tags";

const READ_JOINS: &str = "FROM media m \
    JOIN sources s ON s.id = m.source_id \
    JOIN camera_makes mk ON mk.id = m.make_id \
    JOIN camera_models md ON md.id = m.model_id";

/// Low level type for writing media rows; dimension text has already been
/// resolved to surrogate ids.
#[derive(Debug)]
pub(crate) struct MediaSql {
    pub filepath: PathBufSql,
    pub taken_at: i64,
    pub source_id: i64,
    pub orientation: OrientationSql,
    pub make_id: i64,
    pub model_id: i64,
    pub thumbnail: Option<Vec<u8>>,
    pub tags: TagsSql,
}

/// Read-side row with dimension ids joined back to their text values.
#[derive(Debug)]
pub(crate) struct MediaRow {
    pub filepath: PathBufSql,
    pub taken_at: i64,
    pub source: String,
    pub orientation: OrientationSql,
    pub make: String,
    pub model: String,
    pub thumbnail: Option<Vec<u8>>,
    pub tags: TagsSql,
}

impl MediaSql {
    pub fn create_tables(conn: &Connection) -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sources (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS camera_makes (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS camera_models (
                    id INTEGER PRIMARY KEY,
                    make_id INTEGER NOT NULL REFERENCES camera_makes(id),
                    name TEXT NOT NULL,
                    UNIQUE (make_id, name)
            );
            CREATE TABLE IF NOT EXISTS media (
                    filepath TEXT PRIMARY KEY,
                    taken_at INTEGER NOT NULL,
                    source_id INTEGER NOT NULL REFERENCES sources(id),
                    orientation INTEGER NOT NULL,
                    make_id INTEGER NOT NULL REFERENCES camera_makes(id),
                    model_id INTEGER NOT NULL REFERENCES camera_models(id),
                    thumbnail BLOB,
                    tags TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn new(record: &MediaRecord, source_id: i64, make_id: i64, model_id: i64) -> Self {
        Self {
            filepath: record.path.as_path().into(),
            taken_at: record.taken_at,
            source_id,
            orientation: record.orientation.into(),
            make_id,
            model_id,
            thumbnail: record.thumbnail.clone(),
            tags: dedup_tags(record.tags.clone()).into(),
        }
    }

    /// Insert or fully replace every mutable column for the path.
    pub fn upsert(&self, conn: &Connection) -> Result<(), Error> {
        let mut stmt = conn.prepare(
            "INSERT INTO media (filepath, taken_at, source_id, orientation, \
                    make_id, model_id, thumbnail, tags) \
            VALUES (:filepath, :taken_at, :source_id, :orientation, \
                    :make_id, :model_id, :thumbnail, :tags) \
            ON CONFLICT (filepath) DO UPDATE SET \
                    taken_at = excluded.taken_at, \
                    source_id = excluded.source_id, \
                    orientation = excluded.orientation, \
                    make_id = excluded.make_id, \
                    model_id = excluded.model_id, \
                    thumbnail = excluded.thumbnail, \
                    tags = excluded.tags",
        )?;
        stmt.execute(named_params! {
            ":filepath": self.filepath,
            ":taken_at": self.taken_at,
            ":source_id": self.source_id,
            ":orientation": self.orientation,
            ":make_id": self.make_id,
            ":model_id": self.model_id,
            ":thumbnail": &self.thumbnail,
            ":tags": self.tags,
        })?;
        Ok(())
    }

    pub fn exists(conn: &Connection, filepath: &PathBufSql) -> Result<bool, Error> {
        conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM media WHERE filepath = :filepath)",
            named_params! { ":filepath": filepath },
            |row| row.get(0),
        )
    }

    pub fn get(conn: &Connection, filepath: &PathBufSql) -> Result<Option<MediaRow>, Error> {
        let mut stmt = conn.prepare(formatcp!(
            "SELECT {READ_COLUMNS} {READ_JOINS} WHERE m.filepath = :filepath"
        ))?;
        let mut rows = stmt.query_map(
            named_params! { ":filepath": filepath },
            |row| MediaRow::try_from(row),
        )?;
        rows.next().transpose()
    }

    /// Every row whose path string starts with `prefix`; unspecified order.
    pub fn get_all_under(conn: &Connection, prefix: &str) -> Result<Vec<MediaRow>, Error> {
        let mut stmt = conn.prepare(formatcp!(
            "SELECT {READ_COLUMNS} {READ_JOINS} \
            WHERE substr(m.filepath, 1, :len) = :prefix"
        ))?;
        let rows = stmt.query_map(
            named_params! {
                ":len": prefix.chars().count() as i64,
                ":prefix": prefix,
            },
            |row| MediaRow::try_from(row),
        )?;
        rows.collect()
    }
}

impl TryFrom<&Row<'_>> for MediaRow {
    type Error = Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            filepath: row.get(0)?,
            taken_at: row.get(1)?,
            source: row.get(2)?,
            orientation: row.get(3)?,
            make: row.get(4)?,
            model: row.get(5)?,
            thumbnail: row.get(6)?,
            tags: row.get(7)?,
        })
    }
}
