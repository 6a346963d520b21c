//! Pulling journal rows from a database view into a sheet.

use crate::address::RangeRef;
use crate::db::{Connection, DbError, RecordSet, SqlValue, TableName, quote_ident};
use crate::workbook::{Book, Range};
use chrono::NaiveDate;

/// Business date column every journal view exposes.
pub const DATE_COLUMN: &str = "JournalDate";
/// Tie-break for rows sharing a date.
pub const LINE_COLUMN: &str = "JournalLineID";
pub const ACCOUNT_COLUMN: &str = "AccountID";

/// Journal rows up to and including `as_at`, optionally for one account.
///
/// The date column is compared through `date()` so that timestamps on the
/// `as_at` day itself are kept.
#[derive(Clone, Debug, PartialEq)]
pub struct JournalQuery {
    pub view: TableName,
    pub as_at: NaiveDate,
    pub account: Option<String>,
}

impl JournalQuery {
    pub fn new(view: TableName, as_at: NaiveDate) -> Self {
        JournalQuery {
            view,
            as_at,
            account: None,
        }
    }

    pub fn for_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut sql = format!(
            "SELECT * FROM {} WHERE date({}) <= ?1",
            self.view,
            quote_ident(DATE_COLUMN)
        );
        let mut params = vec![SqlValue::Text(self.as_at.format("%Y-%m-%d").to_string())];
        if let Some(account) = &self.account {
            sql.push_str(&format!(" AND {} = ?2", quote_ident(ACCOUNT_COLUMN)));
            params.push(SqlValue::Text(account.clone()));
        }
        sql.push_str(&format!(
            " ORDER BY {}, {}",
            quote_ident(DATE_COLUMN),
            quote_ident(LINE_COLUMN)
        ));
        (sql, params)
    }
}

pub fn fetch(conn: &mut dyn Connection, query: &JournalQuery) -> Result<RecordSet, DbError> {
    let (sql, params) = query.to_sql();
    let records = conn.query(&sql, &params)?;
    log::info!("fetched {} rows from {}", records.rows.len(), query.view);
    Ok(records)
}

/// Replaces whatever sits at and below/right of `anchor` with a headered
/// block of `records`. An empty record set only clears.
pub fn write_record_set(book: &mut Book, anchor: &Range, records: &RecordSet) {
    let start = anchor.area.start;
    if let Some(end) = book.used_range_end(anchor.sheet) {
        if end.row >= start.row && end.col >= start.col {
            let stale = Range {
                sheet: anchor.sheet,
                area: RangeRef::new(start, end),
            };
            book.clear_contents(&stale);
        }
    }

    if records.is_empty() {
        return;
    }
    book.set_values(anchor, records.to_cells());
}
