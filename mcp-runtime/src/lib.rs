use std::sync::Arc;

use clap::Subcommand;
use dd_core::error::ErrorPayload;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

pub mod config;
pub mod google;
pub mod oauth;
pub mod openai;
pub mod pdf;
pub mod resolve;
#[cfg(test)]
mod test_http;
mod tools;
mod util;
pub mod wrike;

pub use config::RuntimeSettings;

use oauth::GoogleAuth;
use resolve::Ranker;
use tools::tool_definitions;
use util::to_pretty_json;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "dd-reporter";

/// Errors returned inside a tool envelope rather than as JSON-RPC errors.
type ToolError = ErrorPayload;

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the DD Reporter MCP server over stdio
    Serve,
    /// Print configuration readiness (same payload as the dd_status tool)
    Status,
}

/// Structured JSON logs on stderr; stdout belongs to the protocol.
/// `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .try_init();
}

pub async fn run(settings: RuntimeSettings, command: McpCommands) -> i32 {
    let server = McpServer::new(settings);
    match command {
        McpCommands::Serve => {
            tracing::info!(
                server = MCP_SERVER_NAME,
                version = env!("CARGO_PKG_VERSION"),
                session_id = %server.session_id,
                ranker = server.ranker.mode(),
                "starting MCP server on stdio"
            );
            let mut reader = BufReader::new(io::stdin());
            let mut writer = io::stdout();
            match server.serve(&mut reader, &mut writer).await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Status => {
            println!("{}", to_pretty_json(&server.status_payload()));
            0
        }
    }
}

/// Run one tool outside the protocol loop and return its envelope.
pub async fn call_tool(settings: RuntimeSettings, name: &str, args: Map<String, Value>) -> Value {
    McpServer::new(settings).call_tool_envelope(name, &args).await
}

/// `true` when an envelope from [`call_tool`] reports success.
pub fn envelope_is_success(envelope: &Value) -> bool {
    envelope.get("status").and_then(Value::as_str) == Some("complete")
}

pub(crate) struct McpServer {
    settings: RuntimeSettings,
    google_auth: Arc<GoogleAuth>,
    ranker: Ranker,
    session_id: String,
}

impl McpServer {
    fn new(settings: RuntimeSettings) -> Self {
        Self {
            google_auth: Arc::new(GoogleAuth::from_settings(&settings)),
            ranker: Ranker::from_settings(&settings),
            session_id: format!("stdio-{}", Uuid::now_v7()),
            settings,
        }
    }

    async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let frame = read_frame(reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(frame) = frame else {
                tracing::info!(session_id = %self.session_id, "stdin closed, shutting down");
                break;
            };

            let (responses, framing) = match frame {
                Frame::Message(incoming, framing) => {
                    (self.handle_incoming_message(incoming).await, framing)
                }
                Frame::Malformed(reason, framing) => {
                    tracing::warn!(reason = %reason, "discarding unparseable message");
                    (
                        vec![error_response(Value::Null, RpcError::parse_error(reason))],
                        framing,
                    )
                }
            };

            for response in responses {
                write_frame(writer, &response, framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }

        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                let result = self.handle_request(method, params).await;
                Some(match result {
                    Ok(payload) => success_response(id, payload),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                tracing::debug!(method, "notification ignored");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let instructions = format!(
            "Due diligence report workflow: call get_site_record with the site name, Wrike ID or permalink; \
pass its drive_folder_url to list_drive_documents; read relevant files with read_drive_document; \
then call create_dd_report with the nested report_data. Use dd_status to check configuration. \
Site matching mode: {}.",
            self.ranker.mode()
        );
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let envelope = self.call_tool_envelope(name, &args).await;
        let is_error = !envelope_is_success(&envelope);
        Ok(build_tool_call_response(envelope, is_error))
    }

    async fn call_tool_envelope(&self, name: &str, args: &Map<String, Value>) -> Value {
        tracing::info!(tool = name, session_id = %self.session_id, "tool called");
        match self.execute_tool(name, args).await {
            Ok(data) => json!({
                "status": "complete",
                "phase": "final",
                "tool": name,
                "data": data
            }),
            Err(err) => {
                tracing::warn!(tool = name, error = %err.error, message = %err.message, "tool failed");
                json!({
                    "status": "error",
                    "phase": "final",
                    "tool": name,
                    "error": err.to_value()
                })
            }
        }
    }
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    // Agents read the text block; structuredContent is for clients that parse it.
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: Some(json!({ "method": method })),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// How a message arrived on stdin; replies use the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    ContentLength,
    NewlineDelimited,
}

#[derive(Debug)]
enum Frame {
    Message(Value, Framing),
    Malformed(String, Framing),
}

async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !in_headers {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Ok(Some(match serde_json::from_str(trimmed) {
                    Ok(value) => Frame::Message(value, Framing::NewlineDelimited),
                    Err(e) => Frame::Malformed(
                        format!("Invalid JSON payload: {e}"),
                        Framing::NewlineDelimited,
                    ),
                }));
            }
            in_headers = true;
        } else if trimmed.is_empty() {
            break;
        }

        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(match serde_json::from_slice(&payload) {
        Ok(value) => Frame::Message(value, Framing::ContentLength),
        Err(e) => Frame::Malformed(format!("Invalid JSON payload: {e}"), Framing::ContentLength),
    }))
}

async fn write_frame<W>(writer: &mut W, value: &Value, framing: Framing) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::NewlineDelimited => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
