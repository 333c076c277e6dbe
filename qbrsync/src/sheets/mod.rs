//! Destination sheets.
//!
//! `SheetApi` is the seam to the sheet service and `SmartsheetClient` its only real
//! implementation. `SheetWriter` holds the replace logic (chunked clear, then a single insert)
//! and is written against the trait.

pub mod smartsheet;
pub mod writer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::rows::CellValue;

pub use smartsheet::SmartsheetClient;
pub use writer::{ClearReport, SheetWriter};

/// Result message the sheet service sends for a successful mutation.
pub const SUCCESS_MESSAGE: &str = "SUCCESS";

/// A destination sheet as loaded before a sync: its schema and the rows it currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub id: u64,
    pub name: String,
    pub columns: Vec<Column>,
    pub row_ids: Vec<u64>,
}

impl Sheet {
    /// The column at a zero-based position.
    pub fn column_at(&self, position: usize) -> Option<&Column> {
        self.columns.iter().find(|column| column.index == position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Column {
    pub id: u64,
    pub index: usize,
    #[serde(default)]
    pub title: String,
}

/// Outcome of a delete or insert, as reported by the sheet service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub message: String,
    pub result_code: i64,
}

impl MutationResult {
    pub fn success() -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            result_code: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.message == SUCCESS_MESSAGE
    }
}

/// A row to insert. Rows always go to the top of the sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRow {
    pub to_top: bool,
    pub cells: Vec<NewCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCell {
    pub column_id: u64,
    pub value: CellValue,
}

/// Access to the sheet service.
///
/// Mutations return `Ok` with a non-success `MutationResult` when the service answered with
/// an error body; `Err` is reserved for transport failures and unreadable responses.
#[async_trait]
pub trait SheetApi: Send + Sync {
    async fn get_sheet(&self, sheet_id: u64) -> Result<Sheet>;

    async fn delete_rows(&self, sheet_id: u64, row_ids: &[u64]) -> Result<MutationResult>;

    async fn add_rows(&self, sheet_id: u64, rows: &[NewRow]) -> Result<MutationResult>;
}
