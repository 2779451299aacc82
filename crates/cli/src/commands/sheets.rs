use clap::Subcommand;
use closer_core::errors::DomainError;
use closer_integrations::google::sheets::{FindQuery, Record};
use serde_json::{json, Value};

use crate::commands::{run_pipeline, CommandResult, GlobalOptions};

#[derive(Debug, Subcommand)]
pub enum SheetsAction {
    #[command(about = "Show the spreadsheet title and its sheets")]
    Metadata,
    #[command(about = "Show the header row and row count")]
    Headers {
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Read rows as records keyed by header, or raw with --raw")]
    Read {
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        raw: bool,
    },
    #[command(about = "Read an A1 range such as A1:C10")]
    Range {
        range: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Find rows containing a value")]
    Find {
        value: String,
        #[arg(long)]
        column: Option<String>,
        #[arg(long)]
        exact: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_delimiter = ',', help = "Only return these columns")]
        columns: Vec<String>,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Append a record given as a JSON object keyed by header")]
    Add {
        #[arg(long)]
        json: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Write one cell; values starting with = are formulas")]
    UpdateCell {
        cell: String,
        value: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Set a column on every row whose match column equals a value")]
    UpdateByMatch {
        #[arg(long)]
        match_column: String,
        #[arg(long)]
        match_value: String,
        #[arg(long)]
        column: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Rename a header cell")]
    RenameColumn {
        from: String,
        to: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    #[command(about = "Delete a whole column")]
    DeleteColumn {
        column: String,
        #[arg(long)]
        sheet: Option<String>,
    },
}

pub fn run(options: &GlobalOptions, action: SheetsAction) -> CommandResult {
    run_pipeline("sheets", options, |runtime| async move {
        let sheets = runtime.sheets()?;
        let (message, data): (String, Value) = match action {
            SheetsAction::Metadata => {
                let metadata = sheets.metadata().await?;
                (format!("{} sheet(s) in `{}`", metadata.sheets.len(), metadata.title), json!(metadata))
            }
            SheetsAction::Headers { sheet } => {
                let report = sheets.headers(sheet.as_deref()).await?;
                (format!("{} columns, {} rows", report.column_count, report.row_count), json!(report))
            }
            SheetsAction::Read { sheet, raw: true } => {
                let rows = sheets.read_raw(sheet.as_deref()).await?;
                (format!("{} raw rows", rows.len()), json!(rows))
            }
            SheetsAction::Read { sheet, raw: false } => {
                let records = sheets.read(sheet.as_deref()).await?;
                (format!("{} records", records.len()), json!(records))
            }
            SheetsAction::Range { range, sheet } => {
                let rows = sheets.query_range(sheet.as_deref(), &range).await?;
                (format!("{} rows in {range}", rows.len()), json!(rows))
            }
            SheetsAction::Find { value, column, exact, limit, columns, sheet } => {
                let query = FindQuery { value, column, exact, limit };
                let matches = sheets.query_by_column(sheet.as_deref(), &query, &columns).await?;
                (format!("{} match(es)", matches.len()), json!(matches))
            }
            SheetsAction::Add { json: raw, sheet } => {
                let record: Record = serde_json::from_str(&raw).map_err(|error| {
                    DomainError::InvalidInput(format!("--json must be an object of strings: {error}"))
                })?;
                let report = sheets.add(sheet.as_deref(), &record).await?;
                ("row appended".to_string(), json!(report))
            }
            SheetsAction::UpdateCell { cell, value, sheet } => {
                let report = sheets.update_cell(sheet.as_deref(), &cell, &value).await?;
                (format!("updated {cell}"), json!(report))
            }
            SheetsAction::UpdateByMatch { match_column, match_value, column, value, sheet } => {
                let updated = sheets
                    .update_by_match(sheet.as_deref(), &match_column, &match_value, &column, &value)
                    .await?;
                (format!("updated {updated} row(s)"), json!({ "updated_rows": updated }))
            }
            SheetsAction::RenameColumn { from, to, sheet } => {
                let report = sheets.rename_column(sheet.as_deref(), &from, &to).await?;
                (format!("renamed `{from}` to `{to}`"), json!(report))
            }
            SheetsAction::DeleteColumn { column, sheet } => {
                sheets.delete_column(sheet.as_deref(), &column).await?;
                (format!("deleted column `{column}`"), Value::Null)
            }
        };
        Ok((message, data))
    })
}
