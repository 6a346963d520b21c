use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest column Excel addresses (XFD).
pub const MAX_COLS: u32 = 16_384;
/// Largest row Excel addresses.
pub const MAX_ROWS: u32 = 1_048_576;

lazy_static! {
    static ref CELL_REGEX: Regex = Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").unwrap();
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid cell address: {0:?}")]
pub struct AddressError(pub String);

/// A single cell position, zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        CellRef { row, col }
    }

    /// Shifts the reference by a row/column offset.
    pub fn offset(&self, rows: u32, cols: u32) -> Self {
        CellRef {
            row: self.row + rows,
            col: self.col + cols,
        }
    }
}

/// Converts a 1-based column number to its letters (1 -> A, 27 -> AA).
pub fn col_to_letter(col: u32) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// Converts column letters to a 1-based column number (A -> 1, AA -> 27).
pub fn letter_to_col(letters: &str) -> u32 {
    letters.chars().fold(0, |acc, c| {
        acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
    })
}

impl FromStr for CellRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = CELL_REGEX
            .captures(s.trim())
            .ok_or_else(|| AddressError(s.to_string()))?;
        let col = letter_to_col(&caps[1]);
        let row: u32 = caps[2].parse().map_err(|_| AddressError(s.to_string()))?;

        if row == 0 || row > MAX_ROWS || col > MAX_COLS {
            return Err(AddressError(s.to_string()));
        }
        Ok(CellRef {
            row: row - 1,
            col: col - 1,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letter(self.col + 1), self.row + 1)
    }
}

/// Rectangular block of cells with inclusive corners, normalized so that
/// `start` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        RangeRef {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn cell(cell: CellRef) -> Self {
        RangeRef {
            start: cell,
            end: cell,
        }
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }
}

impl FromStr for RangeRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(RangeRef::new(a.parse()?, b.parse()?)),
            None => Ok(RangeRef::cell(s.parse()?)),
        }
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}
