use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args};
use dd_core::site::{DEFAULT_SITE_RECORD_TYPE_ID, DEFAULT_SPACE_ID};

pub const WRIKE_API_BASE_URL: &str = "https://www.wrike.com/api/v4";
pub const DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DOCS_API_BASE_URL: &str = "https://docs.googleapis.com/v1";
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OAUTH_PORT: u16 = 8765;
pub const DEFAULT_GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/documents",
];

/// Settings shared by the MCP server and the CLI. Every flag falls back to an
/// environment variable so a `.env` file is enough to configure a deployment.
#[derive(Args, Clone, Debug)]
pub struct RuntimeSettings {
    /// OAuth 2.0 client configuration file (Google "installed app" JSON)
    #[arg(
        long,
        env = "GOOGLE_CLIENT_CONFIG",
        default_value = "credentials/client_secrets.json"
    )]
    pub google_client_config: PathBuf,
    /// Where the user's Google OAuth tokens are stored
    #[arg(long, env = "GOOGLE_TOKEN_FILE", default_value = ".gcp-saved-tokens.json")]
    pub google_token_file: PathBuf,
    /// Local port for the OAuth callback server
    #[arg(long, env = "OAUTH_PORT", default_value_t = DEFAULT_OAUTH_PORT)]
    pub oauth_port: u16,
    /// OAuth scopes (comma separated)
    #[arg(
        long,
        env = "GOOGLE_SCOPES",
        value_delimiter = ',',
        default_values = DEFAULT_GOOGLE_SCOPES
    )]
    pub google_scopes: Vec<String>,
    /// Never open a browser for Google consent; fail with auth_missing instead
    #[arg(
        long,
        env = "DD_NO_INTERACTIVE_AUTH",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub no_interactive_auth: bool,
    #[arg(long, env = "GOOGLE_DRIVE_API_URL", default_value = DRIVE_API_BASE_URL)]
    pub google_drive_api_url: String,
    #[arg(long, env = "GOOGLE_DOCS_API_URL", default_value = DOCS_API_BASE_URL)]
    pub google_docs_api_url: String,
    /// Google Doc id of the master DD report template
    #[arg(long, env = "DD_TEMPLATE_GOOGLE_DOC_ID")]
    pub dd_template_google_doc_id: Option<String>,
    /// Drive folder that contains every site folder
    #[arg(long, env = "GOOGLE_DRIVE_ROOT_FOLDER_ID")]
    pub google_drive_root_folder_id: Option<String>,
    /// Wrike permanent access token
    #[arg(long, env = "WRIKE_ACCESS_TOKEN", hide_env_values = true)]
    pub wrike_access_token: Option<String>,
    #[arg(long, env = "WRIKE_API_URL", default_value = WRIKE_API_BASE_URL)]
    pub wrike_api_url: String,
    /// Wrike space holding the Site Record folders
    #[arg(long, env = "WRIKE_SPACE_ID", default_value = DEFAULT_SPACE_ID)]
    pub wrike_space_id: String,
    /// Custom item type id that marks a folder as a Site Record
    #[arg(
        long,
        env = "WRIKE_SITE_RECORD_TYPE_ID",
        default_value = DEFAULT_SITE_RECORD_TYPE_ID
    )]
    pub wrike_site_record_type_id: String,
    /// Enables LLM-assisted site matching when set
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,
    #[arg(long, env = "OPENAI_API_URL", default_value = OPENAI_API_BASE_URL)]
    pub openai_api_url: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            google_client_config: PathBuf::from("credentials/client_secrets.json"),
            google_token_file: PathBuf::from(".gcp-saved-tokens.json"),
            oauth_port: DEFAULT_OAUTH_PORT,
            google_scopes: DEFAULT_GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            no_interactive_auth: false,
            google_drive_api_url: DRIVE_API_BASE_URL.to_string(),
            google_docs_api_url: DOCS_API_BASE_URL.to_string(),
            dd_template_google_doc_id: None,
            google_drive_root_folder_id: None,
            wrike_access_token: None,
            wrike_api_url: WRIKE_API_BASE_URL.to_string(),
            wrike_space_id: DEFAULT_SPACE_ID.to_string(),
            wrike_site_record_type_id: DEFAULT_SITE_RECORD_TYPE_ID.to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_api_url: OPENAI_API_BASE_URL.to_string(),
        }
    }
}

impl RuntimeSettings {
    pub fn template_doc_id(&self) -> Option<&str> {
        non_blank(self.dd_template_google_doc_id.as_deref())
    }

    pub fn drive_root_folder_id(&self) -> Option<&str> {
        non_blank(self.google_drive_root_folder_id.as_deref())
    }

    pub fn wrike_token(&self) -> Option<&str> {
        non_blank(self.wrike_access_token.as_deref())
    }

    pub fn openai_key(&self) -> Option<&str> {
        non_blank(self.openai_api_key.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: RuntimeSettings,
    }

    #[test]
    fn flags_parse_and_split_scopes() {
        let cli = TestCli::parse_from([
            "dd",
            "--google-scopes",
            "https://a,https://b",
            "--oauth-port",
            "9000",
            "--dd-template-google-doc-id",
            "TEMPLATE",
        ]);
        assert_eq!(cli.settings.google_scopes, vec!["https://a", "https://b"]);
        assert_eq!(cli.settings.oauth_port, 9000);
        assert_eq!(cli.settings.template_doc_id(), Some("TEMPLATE"));
    }

    #[test]
    fn no_interactive_auth_accepts_numeric_env_values() {
        // SAFETY: no other test sets DD_NO_INTERACTIVE_AUTH
        unsafe { std::env::set_var("DD_NO_INTERACTIVE_AUTH", "1") };
        let on = TestCli::try_parse_from(["dd"]).map(|cli| cli.settings.no_interactive_auth);
        unsafe { std::env::set_var("DD_NO_INTERACTIVE_AUTH", "0") };
        let off = TestCli::try_parse_from(["dd"]).map(|cli| cli.settings.no_interactive_auth);
        unsafe { std::env::remove_var("DD_NO_INTERACTIVE_AUTH") };

        assert!(on.unwrap());
        assert!(!off.unwrap());
        assert!(TestCli::parse_from(["dd", "--no-interactive-auth"]).settings.no_interactive_auth);
    }

    #[test]
    fn google_api_urls_default_to_production() {
        let cli = TestCli::parse_from(["dd", "--google-docs-api-url", "http://127.0.0.1:8080/v1"]);
        assert_eq!(cli.settings.google_drive_api_url, DRIVE_API_BASE_URL);
        assert_eq!(cli.settings.google_docs_api_url, "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings = RuntimeSettings {
            dd_template_google_doc_id: Some("   ".to_string()),
            wrike_access_token: Some(String::new()),
            ..RuntimeSettings::default()
        };
        assert_eq!(settings.template_doc_id(), None);
        assert_eq!(settings.wrike_token(), None);
    }
}
