use tracing::{error, info, instrument, warn};

use super::{NewCell, NewRow, Sheet, SheetApi};
use crate::errors::{Error, Result};
use crate::rows::DestinationRow;

/// Smartsheet rejects row deletes naming more ids than this in a single call.
pub const MAX_DELETE_CHUNK: usize = 450;

/// What a clear actually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: usize,
    pub failed_chunks: usize,
}

/// Replaces the contents of destination sheets.
pub struct SheetWriter<'a, W: SheetApi + ?Sized> {
    api: &'a W,
    chunk_size: usize,
}

impl<'a, W: SheetApi + ?Sized> SheetWriter<'a, W> {
    pub fn new(api: &'a W, chunk_size: usize) -> Self {
        Self {
            api,
            chunk_size: chunk_size.clamp(1, MAX_DELETE_CHUNK),
        }
    }

    /// Load a sheet's schema and current row ids.
    pub async fn load(&self, sheet_id: u64) -> Result<Sheet> {
        self.api.get_sheet(sheet_id).await
    }

    /// Delete every row currently in `sheet`, `chunk_size` ids per call.
    ///
    /// A chunk that fails is logged and left behind; the remaining chunks are still attempted.
    #[instrument(skip(self, sheet), fields(sheet_id = sheet.id, rows = sheet.row_ids.len()))]
    pub async fn clear(&self, sheet: &Sheet) -> ClearReport {
        let mut report = ClearReport::default();

        if sheet.row_ids.is_empty() {
            info!("Sheet {} is already empty", sheet.name);
            return report;
        }

        info!("Clearing {} rows from sheet {}", sheet.row_ids.len(), sheet.name);
        for chunk in sheet.row_ids.chunks(self.chunk_size) {
            match self.api.delete_rows(sheet.id, chunk).await {
                Ok(result) if result.is_success() => report.deleted += chunk.len(),
                Ok(result) => {
                    error!(
                        "Failed to delete {} rows from sheet {}: {} (result code {})",
                        chunk.len(),
                        sheet.name,
                        result.message,
                        result.result_code
                    );
                    report.failed_chunks += 1;
                }
                Err(e) => {
                    error!("Failed to delete {} rows from sheet {}: {}", chunk.len(), sheet.name, e);
                    report.failed_chunks += 1;
                }
            }
        }

        if report.failed_chunks > 0 {
            warn!(
                "{} delete chunk(s) failed and were not retried; sheet {} still holds stale rows",
                report.failed_chunks, sheet.name
            );
        }
        report
    }

    /// Resolve row positions to the sheet's column ids. Fails if a row needs a column the sheet
    /// does not have.
    pub fn prepare(&self, sheet: &Sheet, rows: &[DestinationRow]) -> Result<Vec<NewRow>> {
        rows.iter()
            .map(|row| {
                let cells = row
                    .cells
                    .iter()
                    .map(|(position, value)| {
                        let column = sheet.column_at(*position).ok_or_else(|| Error::Sheet {
                            sheet: sheet.name.clone(),
                            result_code: None,
                            message: format!(
                                "row needs column position {position} but the sheet has {} columns",
                                sheet.columns.len()
                            ),
                        })?;
                        Ok(NewCell {
                            column_id: column.id,
                            value: value.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(NewRow { to_top: true, cells })
            })
            .collect()
    }

    /// Insert prepared rows in one call. Returns the number of rows written; a rejected insert
    /// is logged and reported as zero.
    #[instrument(skip(self, sheet, rows), fields(sheet_id = sheet.id, rows = rows.len()))]
    pub async fn insert(&self, sheet: &Sheet, rows: &[NewRow]) -> usize {
        if rows.is_empty() {
            info!("No rows to add to sheet {}", sheet.name);
            return 0;
        }

        match self.api.add_rows(sheet.id, rows).await {
            Ok(result) if result.is_success() => {
                info!("Added {} rows to sheet {}", rows.len(), sheet.name);
                rows.len()
            }
            Ok(result) => {
                error!(
                    "Failed to add rows to sheet {}: {} (result code {})",
                    sheet.name, result.message, result.result_code
                );
                0
            }
            Err(e) => {
                error!("Failed to add rows to sheet {}: {}", sheet.name, e);
                0
            }
        }
    }

    /// Map `rows` onto the sheet's columns and insert them.
    pub async fn write(&self, sheet: &Sheet, rows: &[DestinationRow]) -> Result<usize> {
        let prepared = self.prepare(sheet, rows)?;
        Ok(self.insert(sheet, &prepared).await)
    }

    /// Clear the sheet and write `rows` in its place. The rows are checked against the sheet's
    /// columns before anything is deleted.
    pub async fn replace(&self, sheet: &Sheet, rows: &[DestinationRow]) -> Result<usize> {
        let prepared = self.prepare(sheet, rows)?;
        self.clear(sheet).await;
        Ok(self.insert(sheet, &prepared).await)
    }
}
