//! In-memory workbook reconstructed from the spreadsheet client's payload.
//!
//! The client posts the used range of every sheet together with some book
//! metadata. Handlers read and write cells on the [`Book`]; every write is
//! applied to the local grid and recorded as an [`Action`]. The list of
//! actions is the response body, which the client replays against the live
//! workbook.

use crate::address::{AddressError, CellRef, RangeRef};
use crate::cell::CellValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("invalid workbook payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("workbook has no sheets")]
    NoSheets,
    #[error("active sheet index {0} is out of bounds")]
    ActiveSheet(usize),
    #[error("sheet not found: {0:?}")]
    SheetNotFound(String),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Book metadata as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookInfo {
    pub name: String,
    #[serde(default)]
    pub active_sheet_index: usize,
    #[serde(default)]
    pub selection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetPayload {
    pub name: String,
    #[serde(default)]
    pub values: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub pictures: Vec<Value>,
    #[serde(default)]
    pub tables: Vec<Value>,
}

/// Request body posted by the spreadsheet client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPayload {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub book: BookInfo,
    #[serde(default)]
    pub names: Vec<Value>,
    pub sheets: Vec<SheetPayload>,
}

/// One instruction for the client to apply to the live workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub func: &'static str,
    pub args: Vec<Value>,
    pub values: Vec<Vec<CellValue>>,
    pub sheet_position: usize,
    pub start_row: u32,
    pub start_column: u32,
    pub row_count: u32,
    pub column_count: u32,
}

impl Action {
    fn new(func: &'static str, sheet: SheetId, range: &RangeRef) -> Self {
        Action {
            func,
            args: Vec::new(),
            values: Vec::new(),
            sheet_position: sheet.0,
            start_row: range.start.row,
            start_column: range.start.col,
            row_count: range.row_count(),
            column_count: range.col_count(),
        }
    }
}

/// Position of a sheet inside its book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SheetId(pub usize);

/// A sheet-bound block of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub sheet: SheetId,
    pub area: RangeRef,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    grid: Vec<Vec<CellValue>>,
}

impl Sheet {
    fn cell(&self, at: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.grid
            .get(at.row as usize)
            .and_then(|row| row.get(at.col as usize))
            .unwrap_or(&EMPTY)
    }

    fn set(&mut self, at: CellRef, value: CellValue) {
        let (r, c) = (at.row as usize, at.col as usize);
        if value == CellValue::Empty && self.grid.get(r).is_none_or(|row| c >= row.len()) {
            return;
        }
        if self.grid.len() <= r {
            self.grid.resize_with(r + 1, Vec::new);
        }
        let row = &mut self.grid[r];
        if row.len() <= c {
            row.resize(c + 1, CellValue::Empty);
        }
        row[c] = value;
    }

    /// Bottom-right corner of the non-empty cells, `None` for a blank sheet.
    pub fn used_end(&self) -> Option<CellRef> {
        let mut end: Option<CellRef> = None;
        for (r, row) in self.grid.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    let (r, c) = (r as u32, c as u32);
                    end = Some(match end {
                        Some(e) => CellRef::new(e.row.max(r), e.col.max(c)),
                        None => CellRef::new(r, c),
                    });
                }
            }
        }
        end
    }
}

/// An open workbook.
#[derive(Debug, Clone)]
pub struct Book {
    pub name: String,
    sheets: Vec<Sheet>,
    active: usize,
    selection: Option<RangeRef>,
    actions: Vec<Action>,
}

impl Book {
    pub fn from_slice(body: &[u8]) -> Result<Self, WorkbookError> {
        let payload: BookPayload = serde_json::from_slice(body)?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: BookPayload) -> Result<Self, WorkbookError> {
        if payload.sheets.is_empty() {
            return Err(WorkbookError::NoSheets);
        }
        let active = payload.book.active_sheet_index;
        if active >= payload.sheets.len() {
            return Err(WorkbookError::ActiveSheet(active));
        }
        let selection = match payload.book.selection.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(s.parse()?),
            _ => None,
        };
        let sheets = payload
            .sheets
            .into_iter()
            .map(|s| Sheet {
                name: s.name,
                grid: s.values,
            })
            .collect();

        Ok(Book {
            name: payload.book.name,
            sheets,
            active,
            selection,
            actions: Vec::new(),
        })
    }

    /// Looks a sheet up by name (case-insensitive, like the spreadsheet app).
    pub fn sheet(&self, name: &str) -> Result<SheetId, WorkbookError> {
        self.sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .map(SheetId)
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))
    }

    pub fn first_sheet(&self) -> SheetId {
        SheetId(0)
    }

    pub fn active_sheet(&self) -> SheetId {
        SheetId(self.active)
    }

    pub fn sheet_name(&self, sheet: SheetId) -> &str {
        &self.sheets[sheet.0].name
    }

    /// Current selection; it always lives on the active sheet.
    pub fn selection(&self) -> Option<Range> {
        self.selection.map(|area| Range {
            sheet: self.active_sheet(),
            area,
        })
    }

    pub fn range(&self, sheet: SheetId, address: &str) -> Result<Range, WorkbookError> {
        Ok(Range {
            sheet,
            area: address.parse()?,
        })
    }

    /// Top-left value of the range.
    pub fn value(&self, range: &Range) -> &CellValue {
        self.sheets[range.sheet.0].cell(range.area.start)
    }

    pub fn values(&self, range: &Range) -> Vec<Vec<CellValue>> {
        let sheet = &self.sheets[range.sheet.0];
        let area = range.area;
        (area.start.row..=area.end.row)
            .map(|r| {
                (area.start.col..=area.end.col)
                    .map(|c| sheet.cell(CellRef::new(r, c)).clone())
                    .collect()
            })
            .collect()
    }

    /// Table expansion from the range's top-left cell: down the first column
    /// and right along the first row while cells are non-empty.
    pub fn expand(&self, range: &Range) -> Range {
        let sheet = &self.sheets[range.sheet.0];
        let start = range.area.start;
        if sheet.cell(start).is_empty() {
            return Range {
                sheet: range.sheet,
                area: RangeRef::cell(start),
            };
        }

        let mut end = start;
        while end.row + 1 < crate::address::MAX_ROWS
            && !sheet.cell(CellRef::new(end.row + 1, start.col)).is_empty()
        {
            end.row += 1;
        }
        while end.col + 1 < crate::address::MAX_COLS
            && !sheet.cell(CellRef::new(start.row, end.col + 1)).is_empty()
        {
            end.col += 1;
        }
        Range {
            sheet: range.sheet,
            area: RangeRef::new(start, end),
        }
    }

    /// Bottom-right corner of the sheet's non-empty cells.
    pub fn used_range_end(&self, sheet: SheetId) -> Option<CellRef> {
        self.sheets[sheet.0].used_end()
    }

    /// Writes a block of rows starting at the range's top-left cell.
    pub fn set_values(&mut self, anchor: &Range, values: Vec<Vec<CellValue>>) {
        let rows = values.len() as u32;
        let cols = values.iter().map(Vec::len).max().unwrap_or(0) as u32;
        if rows == 0 || cols == 0 {
            return;
        }

        let start = anchor.area.start;
        // The client expects a rectangular block
        let values: Vec<Vec<CellValue>> = values
            .into_iter()
            .map(|mut row| {
                row.resize(cols as usize, CellValue::Empty);
                row
            })
            .collect();

        let sheet = &mut self.sheets[anchor.sheet.0];
        for (r, row) in values.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet.set(start.offset(r as u32, c as u32), value.clone());
            }
        }

        let area = RangeRef::new(start, start.offset(rows - 1, cols - 1));
        let mut action = Action::new("setValues", anchor.sheet, &area);
        action.values = values;
        self.actions.push(action);
    }

    pub fn set_value(&mut self, anchor: &Range, value: impl Into<CellValue>) {
        self.set_values(anchor, vec![vec![value.into()]]);
    }

    pub fn clear_contents(&mut self, range: &Range) {
        let sheet = &mut self.sheets[range.sheet.0];
        let area = range.area;
        let last_row = (sheet.grid.len() as u32).min(area.end.row + 1);
        for r in area.start.row..last_row {
            for c in area.start.col..=area.end.col {
                sheet.set(CellRef::new(r, c), CellValue::Empty);
            }
        }
        self.actions
            .push(Action::new("clearContents", range.sheet, &range.area));
    }

    /// Sets the fill color of a range, `color` as `#RRGGBB`.
    pub fn set_color(&mut self, range: &Range, color: &str) {
        let mut action = Action::new("setRangeColor", range.sheet, &range.area);
        action.args = vec![Value::String(color.to_string())];
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Response body for the client: the recorded actions.
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "actions": self.actions })
    }
}
