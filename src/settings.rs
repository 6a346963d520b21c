//! Key/value settings read from a reserved two-column sheet region.

use crate::address::{CellRef, RangeRef};
use crate::cell::CellValue;
use crate::workbook::{Book, Range, SheetId, WorkbookError};
use chrono::{Duration, NaiveDate};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Sheet holding the book-level settings table.
pub const SETTINGS_SHEET: &str = "Settings";

pub const DATABASE_SCHEMA: &str = "DatabaseSchema";
pub const JOURNALS_VIEW: &str = "DatabaseVW_TB_Journals";
pub const OFFSETS_VIEW: &str = "DatabaseVW_TB_Offsets";
pub const MAPPING_TABLE: &str = "DatabaseTB_Mapping";
pub const TB_DATE: &str = "TB_Date";
pub const CONNECTOR_ID: &str = "FivetranConnectorID";
pub const CONNECTOR_API_KEY: &str = "FivetranAPIKey";
pub const ACCOUNT_ID: &str = "AccountID";
pub const ANCHOR: &str = "Anchor";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error("missing setting: {0}")]
    Missing(String),
    #[error("setting {key} is not a valid {expected}: {value:?}")]
    Invalid {
        key: String,
        expected: &'static str,
        value: String,
    },
}

/// Ordered settings mapping. A repeated key keeps its first position and
/// takes the value of its last occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: Vec<(String, CellValue)>,
}

impl Settings {
    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Required, non-empty text value.
    pub fn text(&self, key: &str) -> Result<String, SettingsError> {
        self.get(key)
            .and_then(CellValue::as_text)
            .ok_or_else(|| SettingsError::Missing(key.to_string()))
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(CellValue::as_text)
            .unwrap_or_else(|| default.to_string())
    }

    /// Date value: ISO `YYYY-MM-DD` text, or an Excel date serial.
    pub fn date(&self, key: &str) -> Result<NaiveDate, SettingsError> {
        let value = self
            .get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SettingsError::Missing(key.to_string()))?;
        let invalid = || SettingsError::Invalid {
            key: key.to_string(),
            expected: "date",
            value: value.to_string(),
        };

        match value {
            CellValue::Number(serial) => excel_serial_to_date(*serial).ok_or_else(invalid),
            CellValue::Text(s) => {
                let s = s.trim();
                // Payloads may carry a full timestamp; only the date part matters
                let date_part = s.split(['T', ' ']).next().unwrap_or(s);
                NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Reads the key column starting at `start` and the value column right of it.
///
/// Pairs are taken until the first empty key. The result is empty when there
/// are no keys or when every value next to them is empty.
pub fn read_settings(book: &Book, sheet: SheetId, start: &str) -> Result<Settings, SettingsError> {
    let origin: CellRef = book.range(sheet, start)?.area.start;
    let keys = book.expand(&Range {
        sheet,
        area: RangeRef::cell(origin),
    });

    let mut settings = Settings::default();
    if book.value(&keys).is_empty() {
        return Ok(settings);
    }

    let rows = keys.area.row_count();
    let block = book.values(&Range {
        sheet,
        area: RangeRef::new(origin, origin.offset(rows - 1, 1)),
    });
    if block.iter().all(|row| row[1].is_empty()) {
        return Ok(settings);
    }

    for row in block {
        let mut cells = row.into_iter();
        let key = cells.next().and_then(|k| k.as_text());
        let value = cells.next().unwrap_or_default();
        if let Some(key) = key {
            settings.insert(key.trim(), value);
        }
    }
    Ok(settings)
}

/// Book-level settings from `Settings!A1`.
pub fn book_settings(book: &Book) -> Result<Settings, SettingsError> {
    let sheet = book.sheet(SETTINGS_SHEET)?;
    read_settings(book, sheet, "A1")
}

/// Settings from the active sheet's own header area at `A1`.
pub fn sheet_settings(book: &Book) -> Result<Settings, SettingsError> {
    read_settings(book, book.active_sheet(), "A1")
}
