use std::time::Duration;

use dd_core::error::{ErrorPayload, codes};
use dd_core::site::SiteRecord;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::RuntimeSettings;
use crate::resolve::SiteDirectory;
use crate::util::{http_client, truncate_for_error};

const WRIKE_TIMEOUT: Duration = Duration::from_secs(20);
const FOLDER_BATCH_SIZE: usize = 100;
const SITE_RECORD_FIELDS: &str = r#"["customItemTypeId","customFields"]"#;

#[derive(Debug, thiserror::Error)]
pub enum WrikeError {
    #[error("Missing WRIKE_ACCESS_TOKEN. Add it to the .env file or process env.")]
    MissingToken,
    #[error("Failed to reach Wrike API: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("Wrike API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Unexpected Wrike response: {0}")]
    Response(String),
    #[error("{0}")]
    NotFound(String),
}

impl From<WrikeError> for ErrorPayload {
    fn from(err: WrikeError) -> Self {
        let message = err.to_string();
        match err {
            WrikeError::MissingToken => ErrorPayload::new(codes::CONFIG_MISSING, message)
                .with_docs_hint("Set WRIKE_ACCESS_TOKEN to a Wrike permanent access token."),
            WrikeError::Connection(_) => ErrorPayload::new(codes::CONNECTION_ERROR, message)
                .with_docs_hint("Check network access and WRIKE_API_URL."),
            WrikeError::Api { status, .. } => ErrorPayload::new(codes::UPSTREAM_ERROR, message)
                .with_details(json!({ "service": "wrike", "status": status })),
            WrikeError::Response(_) => ErrorPayload::new(codes::RESPONSE_ERROR, message),
            WrikeError::NotFound(_) => ErrorPayload::new(codes::NOT_FOUND, message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WrikeEnvelope {
    #[serde(default)]
    data: Vec<Value>,
}

/// Thin client over the parts of Wrike REST v4 that Site Records need.
pub struct WrikeClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    space_id: String,
    site_record_type_id: String,
}

impl WrikeClient {
    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self, WrikeError> {
        let access_token = settings.wrike_token().ok_or(WrikeError::MissingToken)?;
        let http = http_client(WRIKE_TIMEOUT);
        tracing::debug!(space_id = %settings.wrike_space_id, "wrike client configured");
        Ok(Self {
            http,
            base_url: settings.wrike_api_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            space_id: settings.wrike_space_id.clone(),
            site_record_type_id: settings.wrike_site_record_type_id.clone(),
        })
    }

    async fn get_data(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>, WrikeError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("bearer {}", self.access_token))
            .query(query)
            .send()
            .await
            .map_err(WrikeError::Connection)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(WrikeError::Connection)?;
        if !status.is_success() {
            return Err(WrikeError::Api {
                status: status.as_u16(),
                body: truncate_for_error(&String::from_utf8_lossy(&bytes)),
            });
        }

        let envelope: WrikeEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| WrikeError::Response(format!("invalid JSON body: {e}")))?;
        Ok(envelope.data)
    }

    /// Fetch a single folder/project by its Wrike id.
    pub async fn get_record(&self, record_id: &str) -> Result<SiteRecord, WrikeError> {
        tracing::info!(record_id, "fetching site record");
        let data = self.get_data(&format!("/folders/{record_id}"), &[]).await?;
        let first = data
            .into_iter()
            .next()
            .ok_or_else(|| WrikeError::NotFound(format!("Site record not found: {record_id}")))?;
        let record: SiteRecord = serde_json::from_value(first)
            .map_err(|e| WrikeError::Response(format!("invalid site record: {e}")))?;
        tracing::info!(record_id, title = %record.title, "site record fetched");
        Ok(record)
    }

    pub async fn resolve_permalink(&self, permalink: &str) -> Result<String, WrikeError> {
        tracing::info!(permalink, "resolving permalink to record id");
        let data = self
            .get_data("/folders", &[("permalink", permalink)])
            .await?;
        let first = data
            .first()
            .ok_or_else(|| WrikeError::NotFound(format!("Could not resolve permalink: {permalink}")))?;
        let record_id = first
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WrikeError::Response(format!("Invalid record ID from permalink: {permalink}"))
            })?;
        tracing::info!(permalink, record_id, "permalink resolved");
        Ok(record_id.to_string())
    }

    pub async fn list_folder_ids(&self) -> Result<Vec<String>, WrikeError> {
        let data = self
            .get_data(&format!("/spaces/{}/folders", self.space_id), &[])
            .await?;
        Ok(data
            .iter()
            .filter_map(|item| item.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Every Site Record in the space, whatever its stage.
    pub async fn list_site_records(&self) -> Result<Vec<SiteRecord>, WrikeError> {
        let folder_ids = self.list_folder_ids().await?;
        tracing::info!(count = folder_ids.len(), space_id = %self.space_id, "listed folder ids");

        let mut records = Vec::new();
        for (index, batch) in folder_ids.chunks(FOLDER_BATCH_SIZE).enumerate() {
            let start = index * FOLDER_BATCH_SIZE;
            tracing::debug!(
                from = start + 1,
                to = start + batch.len(),
                total = folder_ids.len(),
                "querying folder batch"
            );
            let data = self
                .get_data(
                    &format!("/folders/{}", batch.join(",")),
                    &[("fields", SITE_RECORD_FIELDS)],
                )
                .await?;
            records.extend(self.site_records_from(data));
        }

        tracing::info!(count = records.len(), "site records collected");
        Ok(records)
    }

    fn site_records_from(&self, data: Vec<Value>) -> Vec<SiteRecord> {
        data.into_iter()
            .filter_map(|item| match serde_json::from_value::<SiteRecord>(item) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable folder");
                    None
                }
            })
            .filter(|record| record.is_site_record(&self.site_record_type_id))
            .collect()
    }
}

impl SiteDirectory for WrikeClient {
    async fn get_record(&self, record_id: &str) -> Result<SiteRecord, ErrorPayload> {
        Ok(WrikeClient::get_record(self, record_id).await?)
    }

    async fn resolve_permalink(&self, permalink: &str) -> Result<String, ErrorPayload> {
        Ok(WrikeClient::resolve_permalink(self, permalink).await?)
    }

    async fn list_site_records(&self) -> Result<Vec<SiteRecord>, ErrorPayload> {
        Ok(WrikeClient::list_site_records(self).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::FakeServer;

    const SITE_TYPE: &str = "IEAGN6I6PIAEZNHZ";

    fn settings(url: &str) -> RuntimeSettings {
        RuntimeSettings {
            wrike_access_token: Some("token".to_string()),
            wrike_api_url: url.to_string(),
            ..RuntimeSettings::default()
        }
    }

    #[test]
    fn missing_token_is_config_error() {
        let err = WrikeClient::from_settings(&RuntimeSettings::default())
            .err()
            .expect("client without token should fail");
        let payload = ErrorPayload::from(err);
        assert_eq!(payload.error, codes::CONFIG_MISSING);
    }

    #[tokio::test]
    async fn unreachable_api_maps_to_connection_error() {
        let client = WrikeClient::from_settings(&settings("http://127.0.0.1:9/api/v4/")).unwrap();
        let err = client
            .get_record("IEAGN6I6ABCDEFGH")
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(err, WrikeError::Connection(_)));
        assert_eq!(ErrorPayload::from(err).error, codes::CONNECTION_ERROR);
    }

    #[test]
    fn batch_filter_keeps_only_site_records() {
        let client = WrikeClient::from_settings(&settings("http://127.0.0.1:9")).unwrap();
        let records = client.site_records_from(vec![
            json!({ "id": "A1", "title": "Site", "customItemTypeId": "IEAGN6I6PIAEZNHZ" }),
            json!({ "id": "A2", "title": "Plain folder" }),
            json!({ "id": "A3", "title": "Other type", "customItemTypeId": "OTHER" }),
            json!({ "title": "missing id" }),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "A1");
    }

    #[test]
    fn api_errors_carry_status_details() {
        let payload = ErrorPayload::from(WrikeError::Api {
            status: 401,
            body: "{\"error\":\"not_authorized\"}".to_string(),
        });
        assert_eq!(payload.error, codes::UPSTREAM_ERROR);
        assert_eq!(payload.details.unwrap()["status"], 401);
        assert!(payload.message.contains("401"));
    }

    #[tokio::test]
    async fn site_records_are_fetched_in_batches_of_one_hundred() {
        let server = FakeServer::start(|request| {
            let path = request.path();
            if path.ends_with("/spaces/SPACE1/folders") {
                let ids: Vec<Value> = (0..150).map(|i| json!({ "id": format!("F{i:03}") })).collect();
                return (200, json!({ "data": ids }).to_string());
            }
            let ids = path.rsplit('/').next().unwrap_or_default();
            let data: Vec<Value> = ids
                .split(',')
                .enumerate()
                .map(|(i, id)| {
                    let kind = if i % 2 == 0 { SITE_TYPE } else { "OTHER" };
                    json!({ "id": id, "title": format!("Site {id}"), "customItemTypeId": kind })
                })
                .collect();
            (200, json!({ "data": data }).to_string())
        })
        .await;

        let client = WrikeClient::from_settings(&RuntimeSettings {
            wrike_space_id: "SPACE1".to_string(),
            ..settings(&format!("{}/api/v4/", server.url))
        })
        .unwrap();
        let records = client.list_site_records().await.unwrap();
        assert_eq!(records.len(), 75);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].path(), "/api/v4/spaces/SPACE1/folders");
        assert_eq!(requests[0].authorization.as_deref(), Some("bearer token"));

        let mut batch_sizes: Vec<usize> = requests[1..]
            .iter()
            .map(|request| {
                assert!(request.path().starts_with("/api/v4/folders/"));
                assert_eq!(request.query("fields").as_deref(), Some(SITE_RECORD_FIELDS));
                request.path().rsplit('/').next().unwrap().split(',').count()
            })
            .collect();
        batch_sizes.sort_unstable();
        assert_eq!(batch_sizes, vec![50, 100]);
    }

    #[tokio::test]
    async fn permalink_resolves_to_first_id() {
        let server = FakeServer::start(|_| {
            (200, json!({ "data": [{ "id": "IDFIRST" }, { "id": "IDSECOND" }] }).to_string())
        })
        .await;
        let client = WrikeClient::from_settings(&settings(&server.url)).unwrap();

        let permalink = "https://www.wrike.com/open.htm?id=42";
        assert_eq!(client.resolve_permalink(permalink).await.unwrap(), "IDFIRST");

        let request = &server.requests()[0];
        assert_eq!(request.path(), "/folders");
        assert_eq!(request.query("permalink").as_deref(), Some(permalink));
    }

    #[tokio::test]
    async fn empty_data_is_not_found() {
        let server = FakeServer::start(|_| (200, r#"{"kind":"folders","data":[]}"#.to_string())).await;
        let client = WrikeClient::from_settings(&settings(&server.url)).unwrap();

        let err = client.get_record("IDMISSING001").await.unwrap_err();
        assert!(matches!(err, WrikeError::NotFound(_)));
        assert_eq!(ErrorPayload::from(err).error, codes::NOT_FOUND);

        let err = client.resolve_permalink("https://www.wrike.com/open.htm?id=7").await.unwrap_err();
        assert_eq!(ErrorPayload::from(err).error, codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn http_errors_keep_status_and_body() {
        let server =
            FakeServer::start(|_| (401, r#"{"error":"not_authorized"}"#.to_string())).await;
        let client = WrikeClient::from_settings(&settings(&server.url)).unwrap();

        match client.get_record("IDAUSTIN0001").await.unwrap_err() {
            WrikeError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("not_authorized"));
            }
            other => panic!("expected an API error, got {other:?}"),
        }
    }
}
