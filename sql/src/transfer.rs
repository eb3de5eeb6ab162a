//! Table export and import as checksummed JSON documents.
//!
//! An export holds the live columns of one table and every row, in column
//! order. The `checksum` is the SHA-256 hex digest of the serialized `rows`
//! array, verified before anything is imported.

use std::path::Path;

use chrono::Utc;
use pxdb_core::{quote_ident, quote_table};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{DbError, Result};
use crate::pool::Pool;
use crate::value::Value;

/// Value of the `format` key in every export.
pub const EXPORT_FORMAT: &str = "pxdb-export";
pub const EXPORT_VERSION: u32 = 1;

/// On-disk export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExport {
    pub format: String,
    pub version: u32,
    pub pool: String,
    pub table: String,
    /// RFC 3339 timestamp.
    pub exported_at: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub checksum: String,
}

/// SHA-256 hex digest of the serialized rows.
pub fn rows_checksum(rows: &[Vec<Value>]) -> Result<String> {
    let bytes = serde_json::to_vec(rows)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Reads every row of `table` and writes it to `path`.
///
/// In dry-run the rows are read and counted but nothing is written.
///
/// # Errors
///
/// [`DbError::MissingTable`] when the table does not exist.
pub fn export_table(pool: &Pool, table: &str, path: &Path, dry: bool) -> Result<TableExport> {
    let mut conn = pool.lease()?;
    let live = pool
        .live_table(&mut conn, table)?
        .ok_or_else(|| DbError::MissingTable {
            pool: pool.name().to_string(),
            table: table.to_string(),
        })?;
    let columns: Vec<String> = live.field_names().into_iter().map(String::from).collect();

    let list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    conn.query(&format!("SELECT {list} FROM {}", quote_table(table)))?;
    let rows: Vec<Vec<Value>> = conn.fetch_all().into_iter().map(|r| r.into_values()).collect();

    let export = TableExport {
        format: EXPORT_FORMAT.to_string(),
        version: EXPORT_VERSION,
        pool: pool.name().to_string(),
        table: table.to_string(),
        exported_at: Utc::now().to_rfc3339(),
        checksum: rows_checksum(&rows)?,
        columns,
        rows,
    };

    if dry {
        info!(pool = %pool.name(), table, rows = export.rows.len(), path = %path.display(), "dry run, export not written");
        return Ok(export);
    }
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json).map_err(|source| DbError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(pool = %pool.name(), table, rows = export.rows.len(), path = %path.display(), "exported table");
    Ok(export)
}

/// Reads and verifies an export document.
pub fn read_export(path: &Path) -> Result<TableExport> {
    let text = std::fs::read_to_string(path).map_err(|source| DbError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let export: TableExport = serde_json::from_str(&text)?;
    let invalid = |reason: String| DbError::InvalidExport {
        path: path.to_path_buf(),
        reason,
    };

    if export.format != EXPORT_FORMAT {
        return Err(invalid(format!("unknown format '{}'", export.format)));
    }
    if export.version != EXPORT_VERSION {
        return Err(invalid(format!("unsupported version {}", export.version)));
    }
    if let Some(row) = export.rows.iter().position(|r| r.len() != export.columns.len()) {
        return Err(invalid(format!(
            "row {row} has {} values for {} columns",
            export.rows[row].len(),
            export.columns.len()
        )));
    }
    let actual = rows_checksum(&export.rows)?;
    if actual != export.checksum {
        return Err(DbError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: export.checksum,
            actual,
        });
    }
    Ok(export)
}

/// Inserts every row of the export at `path` into `table`.
///
/// Returns the number of rows inserted, or that would be in dry-run.
pub fn import_table(pool: &Pool, table: &str, path: &Path, dry: bool) -> Result<usize> {
    let export = read_export(path)?;
    let mut conn = pool.lease()?;
    conn.set_dry(dry);
    if pool.live_table(&mut conn, table)?.is_none() {
        return Err(DbError::MissingTable {
            pool: pool.name().to_string(),
            table: table.to_string(),
        });
    }

    let list = export
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let marks = vec!["?"; export.columns.len()].join(", ");
    let sql = format!("INSERT INTO {} ({list}) VALUES ({marks})", quote_table(table));

    for row in &export.rows {
        conn.prepare(&sql)?;
        for value in row {
            conn.bind(value.clone());
        }
        conn.execute()?;
    }
    info!(pool = %pool.name(), table, rows = export.rows.len(), dry, "imported table");
    Ok(export.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_depends_on_rows() {
        let a = vec![vec![Value::Int(1), Value::from("x")]];
        let b = vec![vec![Value::Int(1), Value::from("y")]];
        let sum = rows_checksum(&a).unwrap();
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, rows_checksum(&a).unwrap());
        assert_ne!(sum, rows_checksum(&b).unwrap());
    }

    #[test]
    fn test_rejects_foreign_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        let doc = TableExport {
            format: "something-else".into(),
            version: 1,
            pool: "main".into(),
            table: "t".into(),
            exported_at: String::new(),
            columns: vec![],
            rows: vec![],
            checksum: rows_checksum(&[]).unwrap(),
        };
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        assert!(matches!(read_export(&path), Err(DbError::InvalidExport { .. })));
    }
}
