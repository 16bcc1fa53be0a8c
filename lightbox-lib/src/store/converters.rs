//! Wrapper types for converting from higher level types to sql data types

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use derive_more::{From, Into};
use rusqlite::{
    types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef},
    Error, ToSql,
};

use crate::media::Orientation;

#[derive(Debug, From, Into)]
pub(crate) struct PathBufSql(pub PathBuf);

impl ToSql for PathBufSql {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>, Error> {
        let v: &OsStr = self.0.as_ref();
        <&str>::try_from(v)
            .map(|v| v.into())
            .map_err(|e| Error::ToSqlConversionFailure(e.into()))
    }
}

impl FromSql for PathBufSql {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(PathBufSql(PathBuf::from(value.as_str()?)))
    }
}

impl From<&Path> for PathBufSql {
    fn from(value: &Path) -> Self {
        Self(value.into())
    }
}

/// Orientation persists as its raw EXIF integer, 0 for unknown.
#[derive(Debug, From, Into)]
pub(crate) struct OrientationSql(pub Orientation);

impl ToSql for OrientationSql {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>, Error> {
        Ok(i64::from(self.0.as_exif()).into())
    }
}

impl FromSql for OrientationSql {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        Ok(OrientationSql(Orientation::from_exif(
            u16::try_from(raw).unwrap_or(0),
        )))
    }
}

/// Tags persist as one `;`-delimited string; empty segments are dropped on
/// the way back out.
#[derive(Debug, From, Into)]
pub(crate) struct TagsSql(pub Vec<String>);

pub(crate) const TAG_DELIMITER: &str = ";";

impl ToSql for TagsSql {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>, Error> {
        Ok(self.0.join(TAG_DELIMITER).into())
    }
}

impl FromSql for TagsSql {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let joined = value.as_str()?;
        Ok(TagsSql(
            joined
                .split(TAG_DELIMITER)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}
