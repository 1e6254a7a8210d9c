use clap::Parser;

use dd_mcp_runtime::{McpCommands, RuntimeSettings, init_tracing, run};

#[derive(Parser)]
#[command(
    name = "dd-mcp",
    version,
    about = "DD Reporter MCP server: Wrike site records, Drive documents and DD report generation over stdio"
)]
struct Cli {
    #[command(flatten)]
    settings: RuntimeSettings,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = run(cli.settings, cli.command.unwrap_or(McpCommands::Serve)).await;
    std::process::exit(code);
}
