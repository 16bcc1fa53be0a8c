//! Get-or-create for the normalized dimension tables.
//!
//! Each lookup is `INSERT OR IGNORE` followed by a read-back inside the same
//! transaction, so concurrent writers racing on the same new text converge on
//! one row.

use rusqlite::{named_params, Connection, Error};

pub(crate) fn source_id(conn: &Connection, name: &str) -> Result<i64, Error> {
    conn.execute(
        "INSERT OR IGNORE INTO sources (name) VALUES (:name)",
        named_params! { ":name": name },
    )?;
    conn.query_row(
        "SELECT id FROM sources WHERE name = :name",
        named_params! { ":name": name },
        |row| row.get(0),
    )
}

pub(crate) fn camera_make_id(conn: &Connection, name: &str) -> Result<i64, Error> {
    conn.execute(
        "INSERT OR IGNORE INTO camera_makes (name) VALUES (:name)",
        named_params! { ":name": name },
    )?;
    conn.query_row(
        "SELECT id FROM camera_makes WHERE name = :name",
        named_params! { ":name": name },
        |row| row.get(0),
    )
}

/// A model name is unique only within its make.
pub(crate) fn camera_model_id(conn: &Connection, make_id: i64, name: &str) -> Result<i64, Error> {
    conn.execute(
        "INSERT OR IGNORE INTO camera_models (make_id, name) VALUES (:make_id, :name)",
        named_params! { ":make_id": make_id, ":name": name },
    )?;
    conn.query_row(
        "SELECT id FROM camera_models WHERE make_id = :make_id AND name = :name",
        named_params! { ":make_id": make_id, ":name": name },
        |row| row.get(0),
    )
}
