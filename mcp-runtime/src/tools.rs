//! The DD tool surface: definitions and implementations.

use dd_core::drive::{
    DUE_DILIGENCE_SUBFOLDER, ReadStrategy, extract_folder_id, infer_mime_from_name, is_drive_id,
};
use dd_core::error::codes;
use dd_core::report::{
    apply_default_placeholders, build_replace_all_text_requests, flatten_report_data,
    report_document_name,
};
use dd_core::site::build_site_summary;
use serde_json::{Map, Value, json};

use crate::google::{GoogleClient, GoogleError};
use crate::resolve::find_site_record;
use crate::wrike::WrikeClient;
use crate::{MCP_SERVER_NAME, McpServer, ToolError, pdf};

const OCR_NOTICE: &str =
    "[PDF text extraction returned no text. This may be an image-only PDF that requires OCR.]";

#[derive(Debug)]
pub(crate) struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub(crate) fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_site_record",
            description: "Fetch a Wrike Site Record by name, Wrike ID, or Wrike permalink. Returns address, school type, stage, Drive folder URL, and all DD-relevant custom fields.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "site_name_or_id": {
                        "type": "string",
                        "description": "Site name (e.g. \"Alpha Austin Demo\"), Wrike record ID, or Wrike permalink URL."
                    }
                },
                "required": ["site_name_or_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "list_drive_documents",
            description: "List files in the site's Google Drive folder and its 01_Due Diligence subfolder. Use the returned ids with read_drive_document.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "drive_folder_url": {
                        "type": "string",
                        "description": "Google Drive folder URL, usually the site's drive_folder_url."
                    }
                },
                "required": ["drive_folder_url"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "read_drive_document",
            description: "Read the full text of a Google Drive file. Google Docs and Slides are exported as plain text, Sheets as CSV, PDFs are text-extracted, text files are downloaded directly.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_id": {
                        "type": "string",
                        "description": "Google Drive file ID from list_drive_documents."
                    },
                    "file_name": {
                        "type": "string",
                        "description": "File name, used to pick the extraction method when metadata is unavailable."
                    }
                },
                "required": ["file_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_dd_report",
            description: "Copy the DD report template into the site's Drive folder as \"<Site> DD Report - MM/DD/YYYY\" and fill every {{placeholder}} from report_data. Nested keys are joined with dots, e.g. q1.rating fills {{q1.rating}}.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "site_name": {
                        "type": "string",
                        "description": "Site name used in the document title."
                    },
                    "drive_folder_url": {
                        "type": "string",
                        "description": "Google Drive folder URL where the report is saved."
                    },
                    "report_data": {
                        "type": "object",
                        "description": "Nested report sections (meta, exec_summary, q1..q4, appendix) with field values."
                    }
                },
                "required": ["site_name", "drive_folder_url", "report_data"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "dd_status",
            description: "Show configuration readiness: Wrike token, matching mode, Google authorization, and report template.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
    ]
}

impl McpServer {
    pub(crate) async fn execute_tool(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match tool_name {
            "get_site_record" => self.tool_get_site_record(args).await,
            "list_drive_documents" => self.tool_list_drive_documents(args).await,
            "read_drive_document" => self.tool_read_drive_document(args).await,
            "create_dd_report" => self.tool_create_dd_report(args).await,
            "dd_status" => Ok(self.status_payload()),
            _ => Err(ToolError::new(
                codes::UNKNOWN_TOOL,
                format!("Unknown tool '{tool_name}'"),
            )
            .with_field("name")
            .with_docs_hint("Call tools/list for the available tools.")),
        }
    }

    fn google_client(&self) -> GoogleClient {
        GoogleClient::from_settings(self.google_auth.clone(), &self.settings)
    }

    async fn tool_get_site_record(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = required_string(args, "site_name_or_id")?;
        let wrike = WrikeClient::from_settings(&self.settings)?;

        let Some(record) = find_site_record(&wrike, &self.ranker, &query).await? else {
            return Err(ToolError::new(
                codes::NOT_FOUND,
                format!("Could not find a Wrike Site Record matching '{query}'."),
            )
            .with_field("site_name_or_id")
            .with_docs_hint("Try the exact site name, a Wrike ID, or a Wrike permalink."));
        };

        let mut summary = build_site_summary(&record);
        if summary.drive_folder_url.is_none() {
            summary.drive_folder_url = self.lookup_site_folder(&summary.title).await;
        }
        tracing::info!(
            id = %summary.id,
            title = %summary.title,
            stage = summary.stage.as_deref(),
            "site record resolved"
        );

        let message = format!("Found Site Record: {}", summary.title);
        Ok(json!({ "site": summary, "message": message }))
    }

    /// Best-effort match of a site title against the Drive root's subfolders.
    async fn lookup_site_folder(&self, title: &str) -> Option<String> {
        let root = self.settings.drive_root_folder_id()?;
        match self.google_client().find_subfolder(root, title).await {
            Ok(Some(folder)) => {
                tracing::info!(title, folder_id = %folder.id, "site folder found under Drive root");
                Some(folder_url(&folder.id))
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(title, error = %err, "site folder lookup failed");
                None
            }
        }
    }

    async fn tool_list_drive_documents(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let drive_folder_url = required_string(args, "drive_folder_url")?;
        let folder_id = folder_id_arg(&drive_folder_url, "drive_folder_url")?;
        let google = self.google_client();

        let root_files = google.list_files(&folder_id).await?;
        tracing::info!(folder_id = %folder_id, count = root_files.len(), "listed root folder");

        let dd_subfolder = google
            .find_subfolder(&folder_id, DUE_DILIGENCE_SUBFOLDER)
            .await?;
        let dd_files = match &dd_subfolder {
            Some(subfolder) => google.list_files(&subfolder.id).await?,
            None => {
                tracing::info!(folder_id = %folder_id, "no {DUE_DILIGENCE_SUBFOLDER} subfolder");
                Vec::new()
            }
        };

        let total = root_files.len() + dd_files.len();
        let message = format!(
            "Found {} files in root folder and {} files in {} subfolder ({} total)",
            root_files.len(),
            dd_files.len(),
            DUE_DILIGENCE_SUBFOLDER,
            total
        );
        Ok(json!({
            "folder_id": folder_id,
            "drive_folder_url": drive_folder_url,
            "root_folder_files": root_files,
            "due_diligence_subfolder_id": dd_subfolder.map(|folder| folder.id),
            "due_diligence_files": dd_files,
            "total_file_count": total,
            "message": message
        }))
    }

    async fn tool_read_drive_document(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let file_id = required_string(args, "file_id")?;
        if !is_drive_id(&file_id) {
            return Err(ToolError::new(
                codes::VALIDATION_FAILED,
                format!("'{file_id}' is not a Google Drive file id"),
            )
            .with_field("file_id")
            .with_docs_hint("Use a file id exactly as returned by list_drive_documents."));
        }
        let file_name_arg = arg_optional_string(args, "file_name")?;
        let google = self.google_client();

        let metadata = match google.file_metadata(&file_id).await {
            Ok(metadata) => Some(metadata),
            Err(GoogleError::Auth(err)) => return Err(err.into()),
            Err(err) => {
                tracing::warn!(file_id = %file_id, error = %err, "metadata unavailable, inferring type from name");
                None
            }
        };

        let file_name = file_name_arg
            .or_else(|| {
                metadata
                    .as_ref()
                    .map(|m| m.name.clone())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| file_id.clone());
        let mime_type = metadata
            .map(|m| m.mime_type)
            .filter(|mime| !mime.is_empty())
            .unwrap_or_else(|| infer_mime_from_name(&file_name).to_string());

        let strategy = ReadStrategy::classify(&mime_type, &file_name);
        tracing::info!(file_id = %file_id, mime_type = %mime_type, strategy = strategy.as_str(), "reading drive document");

        let text = match strategy {
            ReadStrategy::Export { mime } => google.export_text(&file_id, mime).await?,
            ReadStrategy::Pdf => {
                let bytes = google.download(&file_id).await?;
                let text = tokio::task::spawn_blocking(move || pdf::extract_text(&bytes))
                    .await
                    .map_err(|e| {
                        ToolError::new(codes::INTERNAL_ERROR, format!("PDF extraction task failed: {e}"))
                    })?;
                if text.is_empty() {
                    tracing::warn!(file_id = %file_id, "PDF has no extractable text");
                    OCR_NOTICE.to_string()
                } else {
                    text
                }
            }
            ReadStrategy::PlainText => {
                String::from_utf8_lossy(&google.download(&file_id).await?).into_owned()
            }
            ReadStrategy::Generic => match google.download(&file_id).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(GoogleError::Auth(err)) => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(file_id = %file_id, error = %err, "generic download failed");
                    format!("[Could not extract text from file with MIME type: {mime_type}]")
                }
            },
        };

        let character_count = text.chars().count();
        let message = format!("Successfully read {character_count} characters from '{file_name}'");
        Ok(json!({
            "file_id": file_id,
            "file_name": file_name,
            "mime_type": mime_type,
            "read_strategy": strategy.as_str(),
            "character_count": character_count,
            "text": text,
            "message": message
        }))
    }

    async fn tool_create_dd_report(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let site_name = required_string(args, "site_name")?;
        let drive_folder_url = required_string(args, "drive_folder_url")?;
        let folder_id = folder_id_arg(&drive_folder_url, "drive_folder_url")?;
        let report_data = required_object(args, "report_data")?;
        let template_id = self.settings.template_doc_id().ok_or_else(|| {
            ToolError::new(
                codes::CONFIG_MISSING,
                "DD_TEMPLATE_GOOGLE_DOC_ID is not configured.",
            )
            .with_docs_hint("Set DD_TEMPLATE_GOOGLE_DOC_ID to the Google Doc id of the report template.")
        })?;

        let report_date = chrono::Local::now().format("%m/%d/%Y").to_string();
        let doc_name = report_document_name(&site_name, &report_date);
        let google = self.google_client();

        let copied = google
            .copy_document(template_id, &doc_name, &folder_id)
            .await?;
        if copied.id.trim().is_empty() {
            return Err(ToolError::new(
                codes::RESPONSE_ERROR,
                "Template copy returned no document id",
            ));
        }
        let doc_url = copied
            .web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://docs.google.com/document/d/{}/edit", copied.id));

        let mut replacements = flatten_report_data(report_data);
        apply_default_placeholders(&mut replacements, &site_name, &report_date, &doc_url);
        let requests = build_replace_all_text_requests(&replacements);
        let applied = requests.len();

        google
            .batch_update(&copied.id, requests)
            .await
            .map_err(|err| {
                let payload = ToolError::from(err);
                // the copy exists even though filling it failed
                let details = json!({
                    "document_id": copied.id,
                    "document_url": doc_url,
                    "cause": payload.details.clone().unwrap_or(Value::Null)
                });
                payload.with_details(details)
            })?;

        tracing::info!(document_id = %copied.id, applied, "DD report created");
        let message = format!("DD report created: {doc_url}");
        Ok(json!({
            "document": {
                "id": copied.id,
                "name": doc_name,
                "url": doc_url
            },
            "replacements_applied": applied,
            "message": message
        }))
    }

    pub(crate) fn status_payload(&self) -> Value {
        let settings = &self.settings;
        let wrike_ready = settings.wrike_token().is_some();
        let template_ready = settings.template_doc_id().is_some();
        let google = self.google_auth.status();
        let google_ready = google["state"] == "valid"
            || google["state"] == "needs_refresh"
            || (google["client_config_present"] == true && !settings.no_interactive_auth);

        let mut matching = json!({ "mode": self.ranker.mode() });
        if let crate::resolve::Ranker::Llm(llm) = &self.ranker {
            matching["model"] = json!(llm.model());
        }

        json!({
            "server": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "session_id": self.session_id
            },
            "wrike": {
                "access_token_configured": wrike_ready,
                "api_url": settings.wrike_api_url,
                "space_id": settings.wrike_space_id,
                "site_record_type_id": settings.wrike_site_record_type_id
            },
            "matching": matching,
            "google": google,
            "report": {
                "template_configured": template_ready,
                "drive_root_folder_configured": settings.drive_root_folder_id().is_some()
            },
            "ready": wrike_ready && template_ready && google_ready
        })
    }
}

fn folder_url(folder_id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{folder_id}")
}

fn folder_id_arg(url: &str, field: &str) -> Result<String, ToolError> {
    extract_folder_id(url).ok_or_else(|| {
        ToolError::new(
            codes::VALIDATION_FAILED,
            format!("Could not extract a Google Drive folder ID from: {url}"),
        )
        .with_field(field)
        .with_docs_hint("Expected a URL like https://drive.google.com/drive/folders/FOLDER_ID")
    })
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::new(
            codes::VALIDATION_FAILED,
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'{key}' must not be empty"),
        )
        .with_field(key)),
        _ => Err(
            ToolError::new(codes::VALIDATION_FAILED, format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(
            ToolError::new(codes::VALIDATION_FAILED, format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

fn required_object<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Map<String, Value>, ToolError> {
    match args.get(key) {
        Some(Value::Object(map)) => Ok(map),
        None | Some(Value::Null) => Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("Missing required field '{key}'"),
        )
        .with_field(key)),
        Some(_) => Err(
            ToolError::new(codes::VALIDATION_FAILED, format!("'{key}' must be an object"))
                .with_field(key),
        ),
    }
}
