use clap::Subcommand;
use dd_core::error::ErrorPayload;
use dd_mcp_runtime::RuntimeSettings;
use dd_mcp_runtime::oauth::{GoogleAuth, OAuthError};
use serde_json::json;

use crate::util::{print_json, to_pretty_json};

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Authorize Google Drive and Docs access in the browser
    Login,
    /// Delete the saved Google token file
    Logout,
    /// Show the saved token state
    Status,
}

pub async fn run(settings: &RuntimeSettings, command: AuthCommands) -> i32 {
    let auth = GoogleAuth::from_settings(settings);
    match command {
        AuthCommands::Login => match auth.login().await {
            Ok(token) => {
                print_json(&json!({
                    "status": "authenticated",
                    "expiry": token.expiry,
                    "scopes": token.scopes,
                    "token_file": auth.token_file().display().to_string()
                }));
                0
            }
            Err(err) => fail(err),
        },
        AuthCommands::Logout => match auth.logout().await {
            Ok(removed) => {
                print_json(&json!({
                    "status": "logged_out",
                    "token_file_removed": removed,
                    "token_file": auth.token_file().display().to_string()
                }));
                0
            }
            Err(err) => fail(err),
        },
        AuthCommands::Status => {
            let status = auth.status();
            print_json(&status);
            if status["state"] == "needs_authorization" {
                1
            } else {
                0
            }
        }
    }
}

fn fail(err: OAuthError) -> i32 {
    eprintln!("{}", to_pretty_json(&ErrorPayload::from(err).to_value()));
    1
}
