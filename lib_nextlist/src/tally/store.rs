//! # Tally Store
//!
//! The call boundary between the tally applier and whatever holds the NextList
//! rows. Rows and columns are 1-based, matching spreadsheet conventions; row 1
//! is the header row.

use async_trait::async_trait;
use std::cmp::Ordering;
use thiserror::Error;

/// Store client failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open store {store_id}: {reason}")]
    Open { store_id: String, reason: String },

    #[error("Store request failed: {0}")]
    Request(String),

    #[error("Store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected store response: {0}")]
    Decode(String),

    #[error("Cell ({row}, {col}) is outside the sheet")]
    OutOfRange { row: usize, col: usize },
}

/// Location of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

/// Inclusive range of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub first: usize,
    pub last: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One sort criterion: a column and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub col: usize,
    pub order: SortOrder,
}

/// Narrow interface over a tabular store holding one row per game.
///
/// A store handle is opened once per process and reused; implementations do
/// not reconnect.
#[async_trait]
pub trait TallyStore: Send + Sync {
    /// First cell (row-major) whose text equals `text` exactly.
    async fn find_cell(&self, text: &str) -> Result<Option<CellRef>, StoreError>;

    /// Text of one cell; empty when the cell has never been written.
    async fn get_cell(&self, row: usize, col: usize) -> Result<String, StoreError>;

    async fn set_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), StoreError>;

    /// All cell texts of one row, left to right.
    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError>;

    /// Index of the last non-empty row, 0 for an empty sheet.
    async fn last_row(&self) -> Result<usize, StoreError>;

    /// Sorts whole rows in `rows` by `keys`, first key most significant.
    async fn sort(&mut self, rows: RowRange, keys: &[SortKey]) -> Result<(), StoreError>;
}

/// A worksheet held in memory.
///
/// Sorting compares cells numerically when both parse as numbers and as text
/// otherwise, the way spreadsheet sorts behave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySheet {
    rows: Vec<Vec<String>>,
    /// Every successful `set_cell`, in order.
    writes: Vec<(CellRef, String)>,
    /// Every successful `sort`, in order.
    sorts: Vec<(RowRange, Vec<SortKey>)>,
    fail_writes: bool,
}

impl MemorySheet {
    /// Builds a sheet from rows of text; the first row is the header.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            ..Default::default()
        }
    }

    /// Makes every subsequent `set_cell` fail, to exercise write-failure paths.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn writes(&self) -> &[(CellRef, String)] {
        &self.writes
    }

    pub fn sorts(&self) -> &[(RowRange, Vec<SortKey>)] {
        &self.sorts
    }

    fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row.checked_sub(1)?)?
            .get(col.checked_sub(1)?)
            .map(String::as_str)
    }
}

/// Blank cells sort last in either direction.
fn compare_cells(a: &str, b: &str, order: SortOrder) -> Ordering {
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let ordering = match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    };
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

#[async_trait]
impl TallyStore for MemorySheet {
    async fn find_cell(&self, text: &str) -> Result<Option<CellRef>, StoreError> {
        for (r, row) in self.rows.iter().enumerate() {
            if let Some(c) = row.iter().position(|cell| cell == text) {
                return Ok(Some(CellRef { row: r + 1, col: c + 1 }));
            }
        }
        Ok(None)
    }

    async fn get_cell(&self, row: usize, col: usize) -> Result<String, StoreError> {
        if row == 0 || col == 0 {
            return Err(StoreError::OutOfRange { row, col });
        }
        Ok(self.cell(row, col).unwrap_or_default().to_string())
    }

    async fn set_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Request("write rejected".to_string()));
        }
        if row == 0 || col == 0 {
            return Err(StoreError::OutOfRange { row, col });
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        self.writes.push((CellRef { row, col }, value.to_string()));
        Ok(())
    }

    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError> {
        Ok(row
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
            .cloned()
            .unwrap_or_default())
    }

    async fn last_row(&self) -> Result<usize, StoreError> {
        Ok(self
            .rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map_or(0, |index| index + 1))
    }

    async fn sort(&mut self, rows: RowRange, keys: &[SortKey]) -> Result<(), StoreError> {
        if rows.first == 0 || rows.last > self.rows.len() {
            return Err(StoreError::OutOfRange { row: rows.last, col: 0 });
        }
        if rows.first <= rows.last {
            let slice = &mut self.rows[rows.first - 1..rows.last];
            slice.sort_by(|a, b| {
                keys.iter()
                    .map(|key| {
                        let index = key.col.saturating_sub(1);
                        let left = a.get(index).map_or("", String::as_str);
                        let right = b.get(index).map_or("", String::as_str);
                        compare_cells(left, right, key.order)
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        self.sorts.push((rows, keys.to_vec()));
        Ok(())
    }
}
