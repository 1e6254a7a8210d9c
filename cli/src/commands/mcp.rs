use dd_mcp_runtime::{McpCommands, RuntimeSettings};

pub async fn run(settings: RuntimeSettings, command: McpCommands) -> i32 {
    dd_mcp_runtime::run(settings, command).await
}
