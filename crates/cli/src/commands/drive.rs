use std::path::PathBuf;

use clap::Subcommand;
use serde_json::{json, Value};

use crate::commands::{run_pipeline, CommandResult, GlobalOptions};

#[derive(Debug, Subcommand)]
pub enum DriveAction {
    #[command(about = "Upload transcripts, proposals and the last deployment URL")]
    Sync,
    #[command(about = "Upload one file into a Drive folder")]
    Upload {
        path: PathBuf,
        #[arg(long, default_value = "exports", help = "transcripts, proposals, deployments or exports")]
        folder: String,
    },
    #[command(about = "List files in a Drive folder, newest first")]
    List {
        #[arg(long, default_value = "proposals")]
        folder: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Download a file by id")]
    Download {
        file_id: String,
        #[arg(long, help = "Directory or file path; defaults to the workspace downloads folder")]
        output: Option<PathBuf>,
    },
}

pub fn run(options: &GlobalOptions, action: DriveAction) -> CommandResult {
    run_pipeline("drive", options, |runtime| async move {
        let (message, data): (String, Value) = match action {
            DriveAction::Sync => {
                let report = runtime.sync_to_drive().await?;
                let message = format!(
                    "uploaded {} file(s), {} failed",
                    report.uploaded.len(),
                    report.failed.len()
                );
                (message, json!(report))
            }
            DriveAction::Upload { path, folder } => {
                let file = runtime.upload_to_drive(&path, &folder).await?;
                (format!("uploaded {}", file.name), json!(file))
            }
            DriveAction::List { folder, limit } => {
                let files = runtime.list_drive_files(&folder, limit).await?;
                (format!("{} file(s) in {folder}", files.len()), json!(files))
            }
            DriveAction::Download { file_id, output } => {
                let path = runtime.download_from_drive(&file_id, output).await?;
                (format!("downloaded to {}", path.display()), json!({ "file_id": file_id, "path": path }))
            }
        };
        Ok((message, data))
    })
}
