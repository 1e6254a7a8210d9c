use clap::{Parser, Subcommand};
use dd_mcp_runtime::{McpCommands, RuntimeSettings, init_tracing};

mod commands;
mod util;

use commands::auth::AuthCommands;
use commands::tools::{DriveCommands, ReportCommands};

#[derive(Parser)]
#[command(
    name = "ddr",
    version,
    about = "DD Reporter CLI: site records, Drive documents and DD reports from the terminal"
)]
struct Cli {
    #[command(flatten)]
    settings: RuntimeSettings,

    /// Log level when RUST_LOG is unset (logs go to stderr)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Google authorization
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Look up a Wrike Site Record by name, ID, or permalink
    Site {
        /// Site name, Wrike record ID, or Wrike permalink
        query: String,
    },
    /// Google Drive documents
    Drive {
        #[command(subcommand)]
        command: DriveCommands,
    },
    /// DD report generation
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Call any MCP tool directly
    Tool {
        /// Tool name (see `ddr mcp status` or tools/list)
        name: String,
        /// Tool arguments as inline JSON, @file, or @- for stdin
        #[arg(long)]
        args: Option<String>,
    },
    /// MCP server over stdio
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let settings = cli.settings;
    let code = match cli.command {
        Commands::Auth { command } => commands::auth::run(&settings, command).await,
        Commands::Site { query } => commands::tools::site(settings, &query).await,
        Commands::Drive { command } => commands::tools::drive(settings, command).await,
        Commands::Report { command } => commands::tools::report(settings, command).await,
        Commands::Tool { name, args } => {
            commands::tools::tool(settings, &name, args.as_deref()).await
        }
        Commands::Mcp { command } => commands::mcp::run(settings, command).await,
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_create_parses_flags() {
        let cli = Cli::parse_from([
            "ddr",
            "report",
            "create",
            "--site-name",
            "Alpha Austin",
            "--drive-folder-url",
            "https://drive.google.com/drive/folders/F1",
            "--data",
            "@report.json",
        ]);
        match cli.command {
            Commands::Report {
                command:
                    ReportCommands::Create {
                        site_name, data, ..
                    },
            } => {
                assert_eq!(site_name, "Alpha Austin");
                assert_eq!(data, "@report.json");
            }
            _ => panic!("expected report create"),
        }
    }

    #[test]
    fn drive_read_takes_optional_name() {
        let cli = Cli::parse_from(["ddr", "drive", "read", "FILE1", "--name", "Survey.pdf"]);
        assert!(matches!(
            cli.command,
            Commands::Drive {
                command: DriveCommands::Read { ref file_id, name: Some(ref name) }
            } if file_id == "FILE1" && name == "Survey.pdf"
        ));
    }
}
