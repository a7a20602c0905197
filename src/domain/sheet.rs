//! Sheet domain model
//!
//! A sheet is the in-memory form of one dataset's tabular source: a named,
//! possibly ragged grid of text cells plus presentation metadata (column
//! widths, merged regions, a style table with cell references, and a freeze
//! boundary). The metadata is persisted and round-tripped but has no effect
//! on projections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CellRefError {
    #[error("Invalid cell reference '{0}': expected A1 notation")]
    InvalidCell(String),

    #[error("Invalid cell range '{0}': expected A1:B2 notation")]
    InvalidRange(String),
}

/// Zero-based cell coordinates, written in A1 notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Converts a zero-based column index to letters (`0 -> A`, `26 -> AA`)
fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellRef {
    type Err = CellRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CellRefError::InvalidCell(s.to_string());

        let split = s.find(|c: char| !c.is_ascii_uppercase()).ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut col: usize = 0;
        for b in letters.bytes() {
            col = col
                .checked_mul(26)
                .and_then(|c| c.checked_add((b - b'A') as usize + 1))
                .ok_or_else(invalid)?;
        }

        let row: usize = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(Self { row: row - 1, col: col - 1 })
    }
}

impl TryFrom<String> for CellRef {
    type Error = CellRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRef> for String {
    fn from(cell: CellRef) -> Self {
        cell.to_string()
    }
}

/// A rectangular merged region, `start` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Creates a range from any two opposite corners
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = CellRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(':')
            .ok_or_else(|| CellRefError::InvalidRange(s.to_string()))?;
        let a: CellRef = a.parse().map_err(|_| CellRefError::InvalidRange(s.to_string()))?;
        let b: CellRef = b.parse().map_err(|_| CellRefError::InvalidRange(s.to_string()))?;
        Ok(Self::new(a, b))
    }
}

impl TryFrom<String> for CellRange {
    type Error = CellRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRange> for String {
    fn from(range: CellRange) -> Self {
        range.to_string()
    }
}

/// Column presentation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMeta {
    /// Width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Free-form column type tag (e.g. `text`)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One sheet of tabular data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetModel {
    /// Sheet name (e.g. `Vocabulary`)
    pub name: String,

    /// Rows of cell text; rows may have different lengths
    #[serde(default)]
    pub rows: Vec<Vec<String>>,

    /// Column metadata keyed by zero-based column index
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cols: BTreeMap<usize, ColumnMeta>,

    /// Merged regions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<CellRange>,

    /// Style table, referenced by index from `cell_styles`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<serde_json::Value>,

    /// Cell style references
    #[serde(default, rename = "cellStyles", skip_serializing_if = "BTreeMap::is_empty")]
    pub cell_styles: BTreeMap<CellRef, usize>,

    /// Top-left cell of the scrolling area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze: Option<CellRef>,
}

impl SheetModel {
    /// Creates a sheet with rows and no metadata
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
            ..Default::default()
        }
    }

    /// A sheet is writable only with a non-empty name and at least one row
    pub fn is_filled(&self) -> bool {
        !self.name.trim().is_empty() && !self.rows.is_empty()
    }

    /// First cell whose style index is outside the style table
    pub fn dangling_style(&self) -> Option<(CellRef, usize)> {
        self.cell_styles
            .iter()
            .find(|(_, index)| **index >= self.styles.len())
            .map(|(cell, index)| (*cell, *index))
    }

    /// Header row, if any
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Text of a cell; missing cells read as empty
    pub fn cell(&self, cell: CellRef) -> &str {
        self.rows
            .get(cell.row)
            .and_then(|row| row.get(cell.col))
            .map(String::as_str)
            .unwrap_or("")
    }
}
