//! Reconciling sheet-resident mapping rows against a keyed table.
//!
//! Each row is applied as an `UPDATE` keyed on the line identifier, falling
//! back to an `INSERT` when nothing matched. The whole batch runs in a single
//! transaction: either every row lands or none does.

use crate::cell::CellValue;
use crate::db::{Connection, DbError, SqlValue, TableName, quote_ident};
use chrono::NaiveDateTime;
use thiserror::Error;

pub const KEY_COLUMN: &str = "JournalLineID";
pub const MAPPING_COLUMN: &str = "Mapping";
pub const OFFSET_COLUMN: &str = "Offset";
pub const MODIFIED_COLUMN: &str = "ModifiedAt";

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("mapping table has no {0} column")]
    MissingColumn(&'static str),
    #[error(transparent)]
    Database(#[from] DbError),
}

/// A normalized row ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct MappingRow {
    pub key: SqlValue,
    pub mapping: String,
    pub offset: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub updated: usize,
    pub inserted: usize,
}

fn column(header: &[CellValue], name: &'static str) -> Result<usize, UpsertError> {
    header
        .iter()
        .position(|h| {
            h.as_text()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(name))
        })
        .ok_or(UpsertError::MissingColumn(name))
}

/// Extracts mapping rows from a headered table.
///
/// Rows with both Mapping and Offset empty are excluded. The second value is
/// the number of rows skipped for lacking a key.
pub fn collect_rows(table: &[Vec<CellValue>]) -> Result<(Vec<MappingRow>, usize), UpsertError> {
    let Some((header, body)) = table.split_first() else {
        return Err(UpsertError::MissingColumn(KEY_COLUMN));
    };
    let key_idx = column(header, KEY_COLUMN)?;
    let mapping_idx = column(header, MAPPING_COLUMN)?;
    let offset_idx = column(header, OFFSET_COLUMN)?;

    let empty = CellValue::Empty;
    let mut rows = Vec::new();
    let mut skipped = 0;
    for row in body {
        let key = row.get(key_idx).unwrap_or(&empty);
        let mapping = row.get(mapping_idx).unwrap_or(&empty);
        let offset = row.get(offset_idx).unwrap_or(&empty);

        if mapping.is_empty() && offset.is_empty() {
            continue;
        }
        if key.is_empty() {
            log::warn!("skipping mapping row without {KEY_COLUMN}");
            skipped += 1;
            continue;
        }
        rows.push(MappingRow {
            key: SqlValue::from(key),
            mapping: mapping.as_text().unwrap_or_default(),
            offset: offset.as_flag(),
        });
    }
    Ok((rows, skipped))
}

/// Applies `rows` to `table`, stamping each touched row with `modified_at`.
pub fn upsert(
    conn: &mut dyn Connection,
    table: &TableName,
    rows: &[MappingRow],
    modified_at: NaiveDateTime,
) -> Result<UpsertReport, UpsertError> {
    let update = format!(
        "UPDATE {table} SET {} = ?1, {} = ?2, {} = ?3 WHERE {} = ?4",
        quote_ident(MAPPING_COLUMN),
        quote_ident(OFFSET_COLUMN),
        quote_ident(MODIFIED_COLUMN),
        quote_ident(KEY_COLUMN),
    );
    let insert = format!(
        "INSERT INTO {table} ({}, {}, {}, {}) VALUES (?4, ?1, ?2, ?3)",
        quote_ident(KEY_COLUMN),
        quote_ident(MAPPING_COLUMN),
        quote_ident(OFFSET_COLUMN),
        quote_ident(MODIFIED_COLUMN),
    );
    let stamp = SqlValue::Text(modified_at.format("%Y-%m-%d %H:%M:%S").to_string());

    conn.begin()?;
    let mut report = UpsertReport::default();
    for row in rows {
        let params = [
            SqlValue::Text(row.mapping.clone()),
            SqlValue::Integer(row.offset),
            stamp.clone(),
            row.key.clone(),
        ];
        let applied = conn.execute(&update, &params).and_then(|matched| {
            if matched == 0 {
                conn.execute(&insert, &params).map(|_| false)
            } else {
                Ok(true)
            }
        });
        match applied {
            Ok(true) => report.updated += 1,
            Ok(false) => report.inserted += 1,
            Err(e) => {
                if let Err(rollback) = conn.rollback() {
                    log::error!("rollback after failed upsert also failed: {rollback}");
                }
                return Err(e.into());
            }
        }
    }
    conn.commit()?;

    log::info!(
        "upserted into {table}: {} updated, {} inserted",
        report.updated,
        report.inserted
    );
    Ok(report)
}
