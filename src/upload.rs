//! Replacing a database table with a table read from a sheet.

use crate::cell::CellValue;
use crate::db::{Connection, DbError, SqlValue, TableName, quote_ident};

/// Storage class chosen for an uploaded column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Infers a column's type from its non-empty cells; all-empty is TEXT.
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a CellValue>) -> ColumnType {
    let mut seen = None;
    for cell in cells {
        let ty = match cell {
            CellValue::Empty => continue,
            CellValue::Text(s) if s.trim().is_empty() => continue,
            CellValue::Bool(_) => ColumnType::Integer,
            CellValue::Number(_) => ColumnType::Real,
            CellValue::Text(_) => return ColumnType::Text,
        };
        seen = match seen {
            None => Some(ty),
            Some(prev) if prev == ty => Some(ty),
            Some(_) => return ColumnType::Text,
        };
    }
    seen.unwrap_or(ColumnType::Text)
}

/// Header names for the uploaded table; blank headers get positional names.
fn column_names(header: &[CellValue]) -> Vec<String> {
    header
        .iter()
        .enumerate()
        .map(|(i, h)| h.as_text().unwrap_or_else(|| format!("column{}", i + 1)))
        .collect()
}

/// Drops and recreates `table` from a headered block. Returns the number of
/// data rows written; a block without data rows leaves the table untouched.
pub fn replace_table(
    conn: &mut dyn Connection,
    table: &TableName,
    block: &[Vec<CellValue>],
) -> Result<usize, DbError> {
    let Some((header, body)) = block.split_first() else {
        return Ok(0);
    };
    if body.is_empty() {
        return Ok(0);
    }

    let names = column_names(header);
    let empty = CellValue::Empty;
    let definitions: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = infer_column_type(body.iter().map(|row| row.get(i).unwrap_or(&empty)));
            format!("{} {}", quote_ident(name), ty.sql())
        })
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let insert = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", "),
        placeholders.join(", ")
    );

    conn.begin()?;
    let result = (|| -> Result<(), DbError> {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({});",
            definitions.join(", ")
        ))?;
        for row in body {
            let params: Vec<SqlValue> = (0..names.len())
                .map(|i| SqlValue::from(row.get(i).unwrap_or(&empty)))
                .collect();
            conn.execute(&insert, &params)?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.commit()?;
            log::info!("replaced {table} with {} rows", body.len());
            Ok(body.len())
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback() {
                log::error!("rollback after failed upload also failed: {rollback}");
            }
            Err(e)
        }
    }
}
