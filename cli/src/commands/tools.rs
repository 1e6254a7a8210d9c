use clap::Subcommand;
use dd_mcp_runtime::{RuntimeSettings, call_tool};
use serde_json::{Map, Value, json};

use crate::util::{exit_code_for_envelope, exit_error, print_json, read_json_arg};

#[derive(Subcommand)]
pub enum DriveCommands {
    /// List files in a site folder and its 01_Due Diligence subfolder
    List {
        /// Google Drive folder URL
        drive_folder_url: String,
    },
    /// Print the extracted text of a Drive file
    Read {
        /// Google Drive file ID
        file_id: String,
        /// File name, used when metadata is unavailable
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Copy the template and fill it from report data
    Create {
        #[arg(long)]
        site_name: String,
        /// Google Drive folder URL where the report is saved
        #[arg(long)]
        drive_folder_url: String,
        /// Report data as inline JSON, @file, or @- for stdin
        #[arg(long)]
        data: String,
    },
}

/// Call a tool, print its envelope, and map the outcome to an exit code.
pub async fn run_tool(settings: RuntimeSettings, name: &str, args: Map<String, Value>) -> i32 {
    let envelope = call_tool(settings, name, args).await;
    print_json(&envelope);
    exit_code_for_envelope(&envelope)
}

pub async fn site(settings: RuntimeSettings, query: &str) -> i32 {
    run_tool(settings, "get_site_record", object(json!({ "site_name_or_id": query }))).await
}

pub async fn drive(settings: RuntimeSettings, command: DriveCommands) -> i32 {
    match command {
        DriveCommands::List { drive_folder_url } => {
            run_tool(
                settings,
                "list_drive_documents",
                object(json!({ "drive_folder_url": drive_folder_url })),
            )
            .await
        }
        DriveCommands::Read { file_id, name } => {
            let mut args = object(json!({ "file_id": file_id }));
            if let Some(name) = name {
                args.insert("file_name".to_string(), json!(name));
            }
            run_tool(settings, "read_drive_document", args).await
        }
    }
}

pub async fn report(settings: RuntimeSettings, command: ReportCommands) -> i32 {
    match command {
        ReportCommands::Create {
            site_name,
            drive_folder_url,
            data,
        } => {
            let report_data = read_json_arg(&data).unwrap_or_else(|e| {
                exit_error(&e, Some("Pass --data '{...}' or --data @report.json"))
            });
            run_tool(
                settings,
                "create_dd_report",
                object(json!({
                    "site_name": site_name,
                    "drive_folder_url": drive_folder_url,
                    "report_data": report_data
                })),
            )
            .await
        }
    }
}

pub async fn tool(settings: RuntimeSettings, name: &str, args: Option<&str>) -> i32 {
    let args = match args {
        None => Map::new(),
        Some(raw) => match read_json_arg(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => exit_error("--args must be a JSON object", None),
            Err(e) => exit_error(&e, None),
        },
    };
    run_tool(settings, name, args).await
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
