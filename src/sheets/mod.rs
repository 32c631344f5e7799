//! Spreadsheet mirror: the human-editable copy of the directory.
//!
//! The sheet layout is positional. Column 0 is the handle, then secondary
//! handle, name, address, wishes and the approval flag. The first row that
//! contains [`HEADER_TOKEN`] in any cell is the header and is never parsed.

pub mod google;
pub mod memory;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::directory::AddressRecord;
use crate::error::{BotError, Result};
use crate::normalize::{normalize_handle, normalize_secondary_handle};

pub use google::GoogleSheetsMirror;
pub use memory::InMemoryMirror;

/// Literal text of the handle column header.
pub const HEADER_TOKEN: &str = "Телеграм";

/// Columns written by a push (everything except the approval flag).
pub const PUSH_COLUMNS: usize = 5;

/// Rows shorter than this are malformed and skipped.
const MIN_ROW_CELLS: usize = 2;

/// Localized tokens accepted as "approved" besides boolean literals.
const TRUE_TOKENS: &[&str] = &["1", "да", "ок", "ok", "true", "yes", "t", "y"];

/// Bidirectional mirror of the directory in an external spreadsheet.
#[async_trait]
pub trait SheetMirror: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Read every record from the sheet.
    ///
    /// A sheet with zero rows is a configuration error, not an empty
    /// directory.
    async fn pull(&self) -> anyhow::Result<Vec<AddressRecord>>;

    /// Overwrite the row whose handle matches, or append a new one.
    async fn push(&self, record: &AddressRecord) -> anyhow::Result<()>;
}

/// Parse the approval cell.
pub fn parse_approval(cell: &str) -> bool {
    let cell = cell.trim().to_lowercase();
    TRUE_TOKENS.contains(&cell.as_str())
}

/// True for the header row.
pub fn is_header_row(row: &[String]) -> bool {
    row.iter().any(|cell| cell.trim() == HEADER_TOKEN)
}

/// Decode sheet rows into records.
///
/// Skips short rows, the header row and rows without a usable handle.
pub fn rows_to_records(rows: &[Vec<String>]) -> Result<Vec<AddressRecord>> {
    if rows.is_empty() {
        return Err(BotError::Sheets("spreadsheet returned no rows".to_owned()));
    }

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() < MIN_ROW_CELLS {
            trace!(?row, "skipping short row");
            continue;
        }
        if is_header_row(row) {
            trace!("skipping header row");
            continue;
        }
        let handle = normalize_handle(&row[0]);
        if handle.is_empty() {
            trace!(?row, "skipping row without handle");
            continue;
        }

        records.push(AddressRecord {
            handle,
            secondary_handle: normalize_secondary_handle(&cell(row, 1)),
            name: cell(row, 2),
            address: cell(row, 3),
            wishes: cell(row, 4),
            approved: parse_approval(&cell(row, 5)),
            ..Default::default()
        });
    }

    debug!(
        rows = rows.len(),
        records = records.len(),
        "sheet rows decoded"
    );
    Ok(records)
}

/// Trimmed cell text; missing trailing cells read as empty.
fn cell(row: &[String], idx: usize) -> String {
    row.get(idx)
        .map(|c| c.trim().to_owned())
        .unwrap_or_default()
}

/// The data columns written for `record`.
pub fn record_to_row(record: &AddressRecord) -> Vec<String> {
    vec![
        record.handle.clone(),
        record.secondary_handle.clone(),
        record.name.clone(),
        record.address.clone(),
        record.wishes.clone(),
    ]
}

/// Index of the data row holding `handle`, if any.
pub fn find_row(rows: &[Vec<String>], handle: &str) -> Option<usize> {
    let handle = normalize_handle(handle);
    rows.iter().position(|row| {
        row.len() >= MIN_ROW_CELLS && !is_header_row(row) && normalize_handle(&row[0]) == handle
    })
}
