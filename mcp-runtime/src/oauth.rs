//! Google OAuth 2.0 for an installed application.
//!
//! Tokens are kept in the authorized-user JSON layout used by google-auth, so
//! a token file written by other Google tooling can be reused as is. When no
//! usable token exists the loopback consent flow is run: a browser is opened
//! and the authorization code is received on a local callback port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dd_core::auth::{generate_code_challenge, generate_code_verifier, generate_state};
use dd_core::error::{ErrorPayload, codes};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::config::RuntimeSettings;
use crate::util::{http_client, truncate_for_error, write_private_file};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const EXPIRY_BUFFER_MINUTES: i64 = 5;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const TOKEN_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Google OAuth client config not found at {0}")]
    MissingClientConfig(PathBuf),
    #[error("Invalid Google OAuth client config {path}: {reason}")]
    InvalidClientConfig { path: PathBuf, reason: String },
    #[error("Google authorization required: {0}")]
    AuthorizationRequired(String),
    #[error("Google authorization failed: {0}")]
    Authorization(String),
    #[error("Google token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("Failed to reach Google OAuth endpoint: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("Token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<OAuthError> for ErrorPayload {
    fn from(err: OAuthError) -> Self {
        let message = err.to_string();
        match err {
            OAuthError::MissingClientConfig(_) | OAuthError::InvalidClientConfig { .. } => {
                ErrorPayload::new(codes::CONFIG_MISSING, message).with_docs_hint(
                    "Download an OAuth client (Desktop app) JSON from Google Cloud Console and point GOOGLE_CLIENT_CONFIG at it.",
                )
            }
            OAuthError::AuthorizationRequired(_)
            | OAuthError::Authorization(_)
            | OAuthError::TokenEndpoint { .. } => ErrorPayload::new(codes::AUTH_MISSING, message)
                .with_docs_hint("Run `ddr auth login` to grant Google Drive and Docs access."),
            OAuthError::Connection(_) => ErrorPayload::new(codes::CONNECTION_ERROR, message),
            OAuthError::Io { .. } => ErrorPayload::new(codes::INTERNAL_ERROR, message),
        }
    }
}

/// The `installed` (or `web`) section of a Google client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an 'installed' or 'web' section".to_string())
    }

    pub fn load(path: &Path) -> Result<Self, OAuthError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| OAuthError::MissingClientConfig(path.to_path_buf()))?;
        Self::parse(&raw).map_err(|reason| OAuthError::InvalidClientConfig {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Authorized-user token file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable token file");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), OAuthError> {
        let data = serde_json::to_vec_pretty(self).map_err(|e| OAuthError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        write_private_file(path, &data).map_err(|source| OAuthError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    NeedsRefresh,
    NeedsAuthorization(&'static str),
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NeedsRefresh => "needs_refresh",
            Self::NeedsAuthorization(_) => "needs_authorization",
        }
    }
}

pub fn token_state(token: Option<&StoredToken>, scopes: &[String], now: DateTime<Utc>) -> TokenState {
    let Some(token) = token else {
        return TokenState::NeedsAuthorization("no saved token");
    };
    if !token.scopes.is_empty() && scopes.iter().any(|s| !token.scopes.contains(s)) {
        return TokenState::NeedsAuthorization("saved token lacks requested scopes");
    }
    let unexpired = token
        .expiry
        .is_none_or(|expiry| expiry > now + chrono::Duration::minutes(EXPIRY_BUFFER_MINUTES));
    if token.token.is_some() && unexpired {
        return TokenState::Valid;
    }
    if token.refresh_token.is_some() {
        TokenState::NeedsRefresh
    } else {
        TokenState::NeedsAuthorization("saved token cannot be refreshed")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

pub struct GoogleAuth {
    client_config: PathBuf,
    token_file: PathBuf,
    scopes: Vec<String>,
    port: u16,
    interactive: bool,
    http: reqwest::Client,
    cache: Mutex<Option<StoredToken>>,
}

impl GoogleAuth {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            client_config: settings.google_client_config.clone(),
            token_file: settings.google_token_file.clone(),
            scopes: settings.google_scopes.clone(),
            port: settings.oauth_port,
            interactive: !settings.no_interactive_auth,
            http: http_client(TOKEN_HTTP_TIMEOUT),
            cache: Mutex::new(None),
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// A bearer token for Drive/Docs calls, refreshing or re-authorizing as needed.
    pub async fn access_token(&self) -> Result<String, OAuthError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = StoredToken::load(&self.token_file);
        }

        let token = match token_state(cache.as_ref(), &self.scopes, Utc::now()) {
            TokenState::Valid => cache.clone(),
            TokenState::NeedsRefresh => match self.refresh(cache.as_ref()).await {
                Ok(token) => Some(token),
                Err(err) if self.interactive => {
                    tracing::warn!(error = %err, "token refresh failed, re-authorizing");
                    Some(self.authorize_interactive().await?)
                }
                Err(err) => return Err(err),
            },
            TokenState::NeedsAuthorization(reason) => {
                if !self.interactive {
                    return Err(OAuthError::AuthorizationRequired(reason.to_string()));
                }
                tracing::info!(reason, "starting interactive Google authorization");
                Some(self.authorize_interactive().await?)
            }
        };

        let token = token.ok_or_else(|| OAuthError::AuthorizationRequired("no saved token".to_string()))?;
        if cache.as_ref() != Some(&token) {
            token.save(&self.token_file)?;
        }
        let access = token
            .token
            .clone()
            .ok_or_else(|| OAuthError::Authorization("token response had no access token".to_string()))?;
        *cache = Some(token);
        Ok(access)
    }

    /// Run the consent flow unconditionally and persist the result.
    pub async fn login(&self) -> Result<StoredToken, OAuthError> {
        let token = self.authorize_interactive().await?;
        token.save(&self.token_file)?;
        *self.cache.lock().await = Some(token.clone());
        Ok(token)
    }

    pub async fn logout(&self) -> Result<bool, OAuthError> {
        *self.cache.lock().await = None;
        if !self.token_file.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.token_file).map_err(|source| OAuthError::Io {
            path: self.token_file.clone(),
            source,
        })?;
        Ok(true)
    }

    pub fn status(&self) -> Value {
        let token = StoredToken::load(&self.token_file);
        let state = token_state(token.as_ref(), &self.scopes, Utc::now());
        json!({
            "client_config": self.client_config.display().to_string(),
            "client_config_present": self.client_config.exists(),
            "token_file": self.token_file.display().to_string(),
            "token_file_present": token.is_some(),
            "has_refresh_token": token.as_ref().is_some_and(|t| t.refresh_token.is_some()),
            "expiry": token.as_ref().and_then(|t| t.expiry),
            "scopes": token.as_ref().map(|t| t.scopes.clone()).unwrap_or_default(),
            "state": state.as_str(),
            "interactive": self.interactive,
        })
    }

    async fn refresh(&self, current: Option<&StoredToken>) -> Result<StoredToken, OAuthError> {
        let current = current
            .ok_or_else(|| OAuthError::AuthorizationRequired("no saved token".to_string()))?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::AuthorizationRequired("no refresh token".to_string()))?;
        tracing::info!("refreshing Google access token");

        let response = self
            .token_request(
                &current.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", current.client_id.as_str()),
                    ("client_secret", current.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        let mut refreshed = current.clone();
        apply_token_response(&mut refreshed, response, Utc::now());
        Ok(refreshed)
    }

    async fn token_request(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(OAuthError::Connection)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }
        response
            .json()
            .await
            .map_err(|e| OAuthError::Authorization(format!("invalid token response: {e}")))
    }

    async fn authorize_interactive(&self) -> Result<StoredToken, OAuthError> {
        let secrets = ClientSecrets::load(&self.client_config)?;
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| {
                OAuthError::Authorization(format!("cannot listen on port {}: {e}", self.port))
            })?;
        let redirect_uri = format!("http://localhost:{}/", self.port);

        let scope = self.scopes.join(" ");
        let authorize_url = url::Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("code_challenge", code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| OAuthError::InvalidClientConfig {
            path: self.client_config.clone(),
            reason: format!("auth_uri is not a URL: {e}"),
        })?;

        // stdout may be the MCP channel
        eprintln!("Opening browser for Google authorization...");
        eprintln!("If the browser doesn't open, visit: {authorize_url}");
        if let Err(err) = open::that(authorize_url.as_str()) {
            tracing::warn!(error = %err, "could not open a browser");
        }

        let (code, received_state) = tokio::select! {
            result = wait_for_callback(listener) => result?,
            _ = tokio::time::sleep(CALLBACK_TIMEOUT) => {
                return Err(OAuthError::Authorization(
                    "authorization timed out after 5 minutes".to_string(),
                ));
            }
        };

        if received_state.as_deref() != Some(state.as_str()) {
            return Err(OAuthError::Authorization(
                "OAuth state mismatch, the callback did not come from this login".to_string(),
            ));
        }

        let response = self
            .token_request(
                &secrets.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("code_verifier", code_verifier.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                ],
            )
            .await?;

        let mut token = StoredToken {
            token: None,
            refresh_token: None,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: self.scopes.clone(),
            expiry: None,
        };
        apply_token_response(&mut token, response, Utc::now());
        tracing::info!(token_file = %self.token_file.display(), "Google authorization complete");
        Ok(token)
    }
}

fn apply_token_response(token: &mut StoredToken, response: TokenResponse, now: DateTime<Utc>) {
    token.token = Some(response.access_token);
    token.expiry = response
        .expires_in
        .map(|secs| now + chrono::Duration::seconds(secs));
    // Google only returns a refresh token on the first consent
    if let Some(refresh_token) = response.refresh_token {
        token.refresh_token = Some(refresh_token);
    }
    if let Some(scope) = response.scope {
        token.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
}

/// Serve the loopback redirect until a request carrying `code` or `error` arrives.
async fn wait_for_callback(listener: TcpListener) -> Result<(String, Option<String>), OAuthError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| OAuthError::Authorization(format!("callback accept failed: {e}")))?;
        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| OAuthError::Authorization(format!("callback read failed: {e}")))?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let path = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("");
        let Ok(url) = url::Url::parse(&format!("http://localhost{path}")) else {
            respond(&mut stream, "400 Bad Request", "Malformed callback request.").await;
            continue;
        };

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.to_string())
        };

        if let Some(error) = param("error") {
            respond(&mut stream, "200 OK", "Authorization was not granted. You can close this tab.").await;
            return Err(OAuthError::Authorization(format!("consent denied: {error}")));
        }
        let Some(code) = param("code") else {
            // favicon and other stray browser requests
            respond(&mut stream, "404 Not Found", "Not found.").await;
            continue;
        };

        respond(&mut stream, "200 OK", "Authenticated! You can close this tab.").await;
        return Ok((code, param("state")));
    }
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><h1>DD Reporter</h1><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %err, "callback response write failed");
    }
    let _ = stream.shutdown().await;
}
