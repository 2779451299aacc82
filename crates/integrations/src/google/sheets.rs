//! Google Sheets v4 client for the onboarding spreadsheet.
//!
//! Row 1 is always the header row. Data rows are addressed by their sheet row number,
//! so the first data row is row 2.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::auth::GoogleAuth;
use super::{api_url, GoogleApi};
use crate::error::{ensure_success, IntegrationError};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SERVICE: &str = "google sheets";
const DEFAULT_SHEET_ALIAS: &str = "Sheet1";
const HEADER_RANGE: &str = "A1:Z1";

pub type Record = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueInput {
    Raw,
    UserEntered,
}

impl ValueInput {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::UserEntered => "USER_ENTERED",
        }
    }

    /// Formulas must be entered as the user would type them; everything else stays literal.
    pub fn for_value(value: &str) -> Self {
        if value.starts_with('=') {
            Self::UserEntered
        } else {
            Self::Raw
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
    pub row_count: i64,
    pub column_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetMetadata {
    pub title: String,
    pub sheets: Vec<SheetInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadersReport {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindMatch {
    pub row_number: usize,
    pub row: Record,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub updated_range: Option<String>,
    pub updated_cells: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindQuery {
    pub value: String,
    pub column: Option<String>,
    pub exact: bool,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn contains(value: impl Into<String>) -> Self {
        Self { value: value.into(), ..Self::default() }
    }

    pub fn exact_in(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { value: value.into(), column: Some(column.into()), exact: true, limit: None }
    }

    fn matches(&self, cell: &str) -> bool {
        if self.exact {
            cell.trim().eq_ignore_ascii_case(self.value.trim())
        } else {
            cell.to_lowercase().contains(&self.value.to_lowercase())
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    properties: RawSpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<RawSheet>,
}

#[derive(Default, Deserialize)]
struct RawSpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct RawSheet {
    properties: RawSheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    grid_properties: RawGrid,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrid {
    #[serde(default)]
    row_count: i64,
    #[serde(default)]
    column_count: i64,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdateResponse {
    updated_range: Option<String>,
    #[serde(default)]
    updated_cells: u64,
    updates: Option<Box<RawUpdateResponse>>,
    #[serde(default)]
    total_updated_cells: u64,
}

impl From<RawUpdateResponse> for UpdateReport {
    fn from(raw: RawUpdateResponse) -> Self {
        match raw.updates {
            Some(nested) => UpdateReport::from(*nested),
            None => UpdateReport {
                updated_range: raw.updated_range,
                updated_cells: raw.updated_cells.max(raw.total_updated_cells),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct SheetsClient {
    api: GoogleApi,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, spreadsheet_id: impl Into<String>) -> Self {
        Self { api: GoogleApi::new(http, auth), spreadsheet_id: spreadsheet_id.into() }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub async fn metadata(&self) -> Result<SpreadsheetMetadata, IntegrationError> {
        let mut url = api_url(SHEETS_BASE, &[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut().append_pair("fields", "properties.title,sheets.properties");
        let response = self.api.request(Method::GET, url).await?.send().await;
        let raw: RawMetadata = decode(response).await?;
        Ok(SpreadsheetMetadata {
            title: raw.properties.title,
            sheets: raw
                .sheets
                .into_iter()
                .map(|sheet| SheetInfo {
                    sheet_id: sheet.properties.sheet_id,
                    title: sheet.properties.title,
                    row_count: sheet.properties.grid_properties.row_count,
                    column_count: sheet.properties.grid_properties.column_count,
                })
                .collect(),
        })
    }

    pub async fn list_sheets(&self) -> Result<Vec<SheetInfo>, IntegrationError> {
        Ok(self.metadata().await?.sheets)
    }

    /// `None` and the `Sheet1` placeholder both mean "the first tab", whatever it is called.
    pub async fn resolve_sheet(&self, sheet: Option<&str>) -> Result<String, IntegrationError> {
        match sheet.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) if name != DEFAULT_SHEET_ALIAS => Ok(name.to_string()),
            _ => self
                .list_sheets()
                .await?
                .into_iter()
                .next()
                .map(|sheet| sheet.title)
                .ok_or_else(|| IntegrationError::NotFound("spreadsheet has no sheets".to_string())),
        }
    }

    pub async fn read_raw(&self, sheet: Option<&str>) -> Result<Vec<Vec<String>>, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        self.get_values(&quote_sheet(&sheet)).await
    }

    pub async fn read(&self, sheet: Option<&str>) -> Result<Vec<Record>, IntegrationError> {
        Ok(rows_to_records(self.read_raw(sheet).await?))
    }

    pub async fn query_range(
        &self,
        sheet: Option<&str>,
        range: &str,
    ) -> Result<Vec<Vec<String>>, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        self.get_values(&qualify(&sheet, range)).await
    }

    pub async fn headers(&self, sheet: Option<&str>) -> Result<HeadersReport, IntegrationError> {
        let sheet_name = self.resolve_sheet(sheet).await?;
        let rows = self.get_values(&quote_sheet(&sheet_name)).await?;
        let headers = rows.first().cloned().unwrap_or_default();
        Ok(HeadersReport {
            sheet_name,
            column_count: headers.len(),
            row_count: rows.len().saturating_sub(1),
            headers,
        })
    }

    pub async fn find(
        &self,
        sheet: Option<&str>,
        query: &FindQuery,
    ) -> Result<Vec<FindMatch>, IntegrationError> {
        let rows = self.read_raw(sheet).await?;
        find_in_rows(&rows, query)
    }

    /// Looks for the value anywhere in the row, the way an operator would eyeball a client.
    pub async fn find_client(
        &self,
        sheet: Option<&str>,
        value: &str,
        limit: Option<usize>,
    ) -> Result<Vec<FindMatch>, IntegrationError> {
        let query = FindQuery { limit, ..FindQuery::contains(value) };
        self.find(sheet, &query).await
    }

    pub async fn query_by_column(
        &self,
        sheet: Option<&str>,
        query: &FindQuery,
        return_columns: &[String],
    ) -> Result<Vec<FindMatch>, IntegrationError> {
        let matches = self.find(sheet, query).await?;
        Ok(project(matches, return_columns))
    }

    /// Appends a record, ordering its values by the header row. Unknown keys are dropped.
    pub async fn add(&self, sheet: Option<&str>, record: &Record) -> Result<UpdateReport, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        let headers = self.header_row(&sheet).await?;
        if headers.is_empty() {
            return Err(IntegrationError::InvalidRequest(format!(
                "sheet `{sheet}` has no header row"
            )));
        }
        let ordered: Vec<Value> = headers
            .iter()
            .map(|header| Value::String(record.get(header).cloned().unwrap_or_default()))
            .collect();
        self.append_values(&sheet, vec![ordered]).await
    }

    pub async fn append(
        &self,
        sheet: Option<&str>,
        rows: Vec<Vec<Value>>,
    ) -> Result<UpdateReport, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        self.append_values(&sheet, rows).await
    }

    pub async fn update_row(
        &self,
        sheet: Option<&str>,
        row_number: usize,
        values: Vec<Value>,
    ) -> Result<UpdateReport, IntegrationError> {
        if row_number == 0 || values.is_empty() {
            return Err(IntegrationError::InvalidRequest(
                "row_number must be >= 1 and values must not be empty".to_string(),
            ));
        }
        let sheet = self.resolve_sheet(sheet).await?;
        let last = column_letter(values.len() - 1);
        let range = qualify(&sheet, &format!("A{row_number}:{last}{row_number}"));
        self.put_values(&range, vec![values], ValueInput::UserEntered).await
    }

    pub async fn update_cell(
        &self,
        sheet: Option<&str>,
        cell: &str,
        value: &str,
    ) -> Result<UpdateReport, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        self.write_cell(&sheet, cell, value).await
    }

    /// Writes several ranges in one `values:batchUpdate` call.
    pub async fn batch_update(
        &self,
        sheet: Option<&str>,
        updates: &[(String, Vec<Vec<Value>>)],
    ) -> Result<UpdateReport, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        let data: Vec<Value> = updates
            .iter()
            .map(|(range, values)| json!({ "range": qualify(&sheet, range), "values": values }))
            .collect();
        let url = api_url(SHEETS_BASE, &[self.spreadsheet_id.as_str(), "values:batchUpdate"])?;
        let body = json!({ "valueInputOption": ValueInput::UserEntered.as_str(), "data": data });
        let response = self.api.request(Method::POST, url).await?.json(&body).send().await;
        let raw: RawUpdateResponse = decode(response).await?;
        Ok(raw.into())
    }

    /// Sets `target_column` on every row whose `match_column` equals `match_value`.
    pub async fn update_by_match(
        &self,
        sheet: Option<&str>,
        match_column: &str,
        match_value: &str,
        target_column: &str,
        new_value: &str,
    ) -> Result<usize, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        let rows = self.get_values(&quote_sheet(&sheet)).await?;
        let headers = rows.first().cloned().unwrap_or_default();
        let target = column_index(&headers, target_column)?;
        let matches = find_in_rows(&rows, &FindQuery::exact_in(match_column, match_value))?;

        let letter = column_letter(target);
        for found in &matches {
            self.write_cell(&sheet, &format!("{letter}{}", found.row_number), new_value).await?;
        }
        info!(
            event_name = "sheets.update_by_match",
            sheet = %sheet,
            column = %target_column,
            rows = matches.len(),
            "rows updated"
        );
        Ok(matches.len())
    }

    pub async fn rename_column(
        &self,
        sheet: Option<&str>,
        old_name: &str,
        new_name: &str,
    ) -> Result<UpdateReport, IntegrationError> {
        let sheet = self.resolve_sheet(sheet).await?;
        let headers = self.header_row(&sheet).await?;
        let index = column_index(&headers, old_name)?;
        self.write_cell(&sheet, &format!("{}1", column_letter(index)), new_name).await
    }

    pub async fn delete_column(&self, sheet: Option<&str>, column: &str) -> Result<(), IntegrationError> {
        let metadata = self.metadata().await?;
        let title = self.resolve_sheet(sheet).await?;
        let sheet_id = metadata
            .sheets
            .iter()
            .find(|info| info.title == title)
            .map(|info| info.sheet_id)
            .ok_or_else(|| IntegrationError::NotFound(format!("sheet `{title}` not found")))?;
        let headers = self.header_row(&title).await?;
        let index = column_index(&headers, column)?;

        let endpoint = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = api_url(SHEETS_BASE, &[endpoint.as_str()])?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "COLUMNS",
                        "startIndex": index,
                        "endIndex": index + 1,
                    }
                }
            }]
        });
        let response = self.api.request(Method::POST, url).await?.json(&body).send().await;
        let _: Value = decode(response).await?;
        info!(event_name = "sheets.column_deleted", sheet = %title, column = %column, "column deleted");
        Ok(())
    }

    async fn header_row(&self, sheet: &str) -> Result<Vec<String>, IntegrationError> {
        let rows = self.get_values(&qualify(sheet, HEADER_RANGE)).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn write_cell(
        &self,
        sheet: &str,
        cell: &str,
        value: &str,
    ) -> Result<UpdateReport, IntegrationError> {
        let range = qualify(sheet, cell);
        self.put_values(&range, vec![vec![Value::String(value.to_string())]], ValueInput::for_value(value))
            .await
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, IntegrationError> {
        let url = api_url(SHEETS_BASE, &[self.spreadsheet_id.as_str(), "values", range])?;
        let response = self.api.request(Method::GET, url).await?.send().await;
        let body: ValueRange = decode(response).await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn put_values(
        &self,
        range: &str,
        values: Vec<Vec<Value>>,
        input: ValueInput,
    ) -> Result<UpdateReport, IntegrationError> {
        let mut url = api_url(SHEETS_BASE, &[self.spreadsheet_id.as_str(), "values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", input.as_str());
        let body = json!({ "range": range, "values": values });
        let response = self.api.request(Method::PUT, url).await?.json(&body).send().await;
        let raw: RawUpdateResponse = decode(response).await?;
        Ok(raw.into())
    }

    async fn append_values(
        &self,
        sheet: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<UpdateReport, IntegrationError> {
        let range = format!("{}:append", qualify(sheet, "A1"));
        let mut url = api_url(SHEETS_BASE, &[self.spreadsheet_id.as_str(), "values", range.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", ValueInput::UserEntered.as_str())
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": rows });
        let response = self.api.request(Method::POST, url).await?.json(&body).send().await;
        let raw: RawUpdateResponse = decode(response).await?;
        info!(event_name = "sheets.rows_appended", sheet = %sheet, "rows appended");
        Ok(raw.into())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, IntegrationError> {
    let response = response.map_err(IntegrationError::transport(SERVICE))?;
    let response = ensure_success(SERVICE, response).await?;
    response.json().await.map_err(IntegrationError::decode(SERVICE))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Zero-based column index to A1 letters: 0 -> A, 25 -> Z, 26 -> AA, 701 -> ZZ, 702 -> AAA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Prefixes an A1 range with the quoted sheet name unless it already names a sheet.
pub fn qualify(sheet: &str, range: &str) -> String {
    if range.contains('!') {
        range.to_string()
    } else {
        format!("{}!{range}", quote_sheet(sheet))
    }
}

/// Exact header match first, then a case-insensitive one.
pub fn column_index(headers: &[String], column: &str) -> Result<usize, IntegrationError> {
    headers
        .iter()
        .position(|header| header == column)
        .or_else(|| headers.iter().position(|header| header.eq_ignore_ascii_case(column.trim())))
        .ok_or_else(|| IntegrationError::NotFound(format!("column `{column}` not found")))
}

pub fn rows_to_records(rows: Vec<Vec<String>>) -> Vec<Record> {
    let mut rows = rows.into_iter();
    let Some(headers) = rows.next() else {
        return Vec::new();
    };
    rows.map(|row| to_record(&headers, &row)).collect()
}

fn to_record(headers: &[String], row: &[String]) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| (header.clone(), row.get(index).cloned().unwrap_or_default()))
        .collect()
}

pub fn find_in_rows(rows: &[Vec<String>], query: &FindQuery) -> Result<Vec<FindMatch>, IntegrationError> {
    let Some((headers, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };
    let column = query.column.as_deref().map(|name| column_index(headers, name)).transpose()?;
    let limit = query.limit.unwrap_or(usize::MAX);

    Ok(data
        .iter()
        .enumerate()
        .filter(|(_, row)| match column {
            Some(index) => row.get(index).map(|cell| query.matches(cell)).unwrap_or(false),
            None => row.iter().any(|cell| query.matches(cell)),
        })
        .take(limit)
        .map(|(index, row)| FindMatch { row_number: index + 2, row: to_record(headers, row) })
        .collect())
}

fn project(matches: Vec<FindMatch>, return_columns: &[String]) -> Vec<FindMatch> {
    if return_columns.is_empty() {
        return matches;
    }
    matches
        .into_iter()
        .map(|found| FindMatch {
            row_number: found.row_number,
            row: found
                .row
                .into_iter()
                .filter(|(header, _)| {
                    return_columns.iter().any(|wanted| wanted.eq_ignore_ascii_case(header))
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        column_index, column_letter, find_in_rows, project, qualify, rows_to_records, FindQuery,
        RawUpdateResponse, UpdateReport, ValueInput,
    };
    use crate::error::IntegrationError;

    fn sheet() -> Vec<Vec<String>> {
        [
            vec!["Name", "Email", "Plan"],
            vec!["Acme Corp", "ops@acme.test", "Growth"],
            vec!["Globex", "hi@globex.test"],
            vec!["acme labs", "lab@acme.test", "Starter"],
        ]
        .into_iter()
        .map(|row| row.into_iter().map(str::to_string).collect())
        .collect()
    }

    #[test]
    fn column_letters_are_bijective_base_26() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(52), "BA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn ranges_are_qualified_with_quoted_sheet_names() {
        assert_eq!(qualify("Leads", "A1:Z1"), "'Leads'!A1:Z1");
        assert_eq!(qualify("Bob's", "B2"), "'Bob''s'!B2");
        assert_eq!(qualify("Leads", "Other!C3"), "Other!C3");
    }

    #[test]
    fn records_pad_short_rows() {
        let records = rows_to_records(sheet());
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["Name"], "Globex");
        assert_eq!(records[1]["Plan"], "");
    }

    #[test]
    fn substring_search_spans_all_columns_case_insensitively() {
        let matches = find_in_rows(&sheet(), &FindQuery::contains("ACME")).expect("find");
        let rows: Vec<usize> = matches.iter().map(|found| found.row_number).collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn exact_column_search_and_limit() {
        let exact = find_in_rows(&sheet(), &FindQuery::exact_in("name", "acme corp")).expect("find");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].row["Email"], "ops@acme.test");

        let limited = FindQuery { limit: Some(1), ..FindQuery::contains("acme") };
        assert_eq!(find_in_rows(&sheet(), &limited).expect("find").len(), 1);
    }

    #[test]
    fn unknown_column_is_not_found() {
        let error = find_in_rows(&sheet(), &FindQuery::exact_in("Phone", "1")).expect_err("missing");
        assert!(matches!(error, IntegrationError::NotFound(_)));
        assert!(column_index(&sheet()[0], "plan").is_ok());
    }

    #[test]
    fn projection_keeps_requested_columns() {
        let matches = find_in_rows(&sheet(), &FindQuery::contains("globex")).expect("find");
        let projected = project(matches, &["email".to_string()]);
        assert_eq!(projected[0].row.len(), 1);
        assert_eq!(projected[0].row["Email"], "hi@globex.test");
    }

    #[test]
    fn formulas_use_user_entered_input() {
        assert_eq!(ValueInput::for_value("=SUM(A1:A3)"), ValueInput::UserEntered);
        assert_eq!(ValueInput::for_value("plain"), ValueInput::Raw);
    }

    #[test]
    fn append_responses_unwrap_nested_updates() {
        let raw: RawUpdateResponse = serde_json::from_value(json!({
            "spreadsheetId": "x",
            "updates": { "updatedRange": "'Leads'!A5:C5", "updatedCells": 3 }
        }))
        .expect("parse");
        assert_eq!(
            UpdateReport::from(raw),
            UpdateReport { updated_range: Some("'Leads'!A5:C5".to_string()), updated_cells: 3 }
        );
    }
}
