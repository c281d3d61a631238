//! # Google Sheets Store
//!
//! [`TallyStore`] over the Google Sheets v4 REST API, working on the first
//! worksheet of a spreadsheet. Requests go through the retrying
//! [`ApiClient`], normally authorized with [`SHEETS_SCOPES`] through
//! [`Authorization::google`](crate::retrieve::ky_http::Authorization::google).

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::store::{CellRef, RowRange, SortKey, SortOrder, StoreError, TallyStore};
use crate::retrieve::ky_http::{ApiClient, ApiResponse};

/// OAuth scope for reading and writing spreadsheets.
pub const SHEETS_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Handle on the first worksheet of one spreadsheet.
pub struct SheetsStore {
    api: ApiClient,
    spreadsheet_id: String,
    sheet_id: i64,
    title: String,
}

impl SheetsStore {
    /// Opens `spreadsheet_id` and binds to its first worksheet.
    pub async fn open(api: ApiClient, spreadsheet_id: &str) -> Result<Self, StoreError> {
        let url = api.endpoint(&["spreadsheets", spreadsheet_id]);
        let response = api
            .request::<Spreadsheet, ()>(Method::GET, url, &[("fields", "sheets.properties")], None)
            .await
            .map_err(|e| StoreError::Open {
                store_id: spreadsheet_id.to_string(),
                reason: e.to_string(),
            })?;
        let spreadsheet = expect_data(response).map_err(|e| StoreError::Open {
            store_id: spreadsheet_id.to_string(),
            reason: e.to_string(),
        })?;
        let first = spreadsheet
            .sheets
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Open {
                store_id: spreadsheet_id.to_string(),
                reason: "spreadsheet has no worksheets".to_string(),
            })?;

        log::info!(
            "Opened spreadsheet {} worksheet {:?}",
            spreadsheet_id,
            first.properties.title
        );
        Ok(Self {
            api,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_id: first.properties.sheet_id,
            title: first.properties.title,
        })
    }

    /// A1 range on this worksheet; an empty `cells` means the whole sheet.
    fn range(&self, cells: &str) -> String {
        let title = format!("'{}'", self.title.replace('\'', "''"));
        if cells.is_empty() {
            title
        } else {
            format!("{title}!{cells}")
        }
    }

    async fn values(&self, cells: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let range = self.range(cells);
        let url = self
            .api
            .endpoint(&["spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()]);
        let response = self
            .api
            .request::<ValueRange, ()>(Method::GET, url, &[], None)
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(expect_data(response)?
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

#[async_trait]
impl TallyStore for SheetsStore {
    async fn find_cell(&self, text: &str) -> Result<Option<CellRef>, StoreError> {
        let rows = self.values("").await?;
        Ok(rows.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|cell| cell == text)
                .map(|c| CellRef { row: r + 1, col: c + 1 })
        }))
    }

    async fn get_cell(&self, row: usize, col: usize) -> Result<String, StoreError> {
        let rows = self.values(&a1_cell(row, col)?).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|cells| cells.into_iter().next())
            .unwrap_or_default())
    }

    async fn set_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        let range = self.range(&a1_cell(row, col)?);
        let url = self
            .api
            .endpoint(&["spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()]);
        let body = json!({ "range": range, "values": [[value]] });
        let response = self
            .api
            .request::<Value, Value>(
                Method::PUT,
                url,
                &[("valueInputOption", "USER_ENTERED")],
                Some(&body),
            )
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        expect_data(response).map(|_| ())
    }

    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError> {
        if row == 0 {
            return Err(StoreError::OutOfRange { row, col: 0 });
        }
        Ok(self
            .values(&format!("{row}:{row}"))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn last_row(&self) -> Result<usize, StoreError> {
        let rows = self.values("").await?;
        Ok(rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map_or(0, |index| index + 1))
    }

    async fn sort(&mut self, rows: RowRange, keys: &[SortKey]) -> Result<(), StoreError> {
        if rows.first == 0 || keys.iter().any(|key| key.col == 0) {
            return Err(StoreError::OutOfRange { row: rows.first, col: 0 });
        }
        let method = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.api.endpoint(&["spreadsheets", method.as_str()]);
        let body = sort_request(self.sheet_id, rows, keys);
        let response = self
            .api
            .request::<Value, Value>(Method::POST, url, &[], Some(&body))
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        expect_data(response).map(|_| ())
    }
}

/// `batchUpdate` body sorting the given 1-based inclusive rows across all columns.
fn sort_request(sheet_id: i64, rows: RowRange, keys: &[SortKey]) -> Value {
    let specs: Vec<Value> = keys
        .iter()
        .map(|key| {
            let order = match key.order {
                SortOrder::Ascending => "ASCENDING",
                SortOrder::Descending => "DESCENDING",
            };
            json!({ "dimensionIndex": key.col - 1, "sortOrder": order })
        })
        .collect();
    json!({
        "requests": [{
            "sortRange": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": rows.first - 1,
                    "endRowIndex": rows.last,
                },
                "sortSpecs": specs,
            }
        }]
    })
}

fn expect_data<T>(response: ApiResponse<T>) -> Result<T, StoreError> {
    if !response.success {
        return Err(StoreError::Status {
            status: response.status,
            body: response.error_body.unwrap_or_default(),
        });
    }
    response
        .data
        .ok_or_else(|| StoreError::Decode(format!("empty body with HTTP {}", response.status)))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Spreadsheet column letters for a 1-based column: 1 -> A, 27 -> AA.
pub fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn a1_cell(row: usize, col: usize) -> Result<String, StoreError> {
    if row == 0 || col == 0 {
        return Err(StoreError::OutOfRange { row, col });
    }
    Ok(format!("{}{}", column_letters(col), row))
}
