use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wrike space that holds every Site Record folder.
pub const DEFAULT_SPACE_ID: &str = "IEAGN6I6I5RFSYZI";
/// Custom item type id of a Site Record.
pub const DEFAULT_SITE_RECORD_TYPE_ID: &str = "IEAGN6I6PIAEZNHZ";

/// Site Record custom fields relevant to due diligence, as `(name, wrike_id)`.
pub const CUSTOM_FIELDS: &[(&str, &str)] = &[
    // Location
    ("market", "IEAGN6I6JUAIIP5D"),
    ("ahj", "IEAGN6I6JUAJA4RM"),
    ("address", "IEAGN6I6JUAIKSH3"),
    ("address_alt", "IEAGN6I6JUAJJ4EV"),
    ("address_county", "IEAGN6I6JUAJNUVF"),
    // Property
    ("square_footage", "IEAGN6I6JUAJJ4FC"),
    ("square_footage_buildings", "IEAGN6I6JUAJJ4FE"),
    // Scores
    ("enrollment_score", "IEAGN6I6JUAKGXNV"),
    ("enrollment_score_plus", "IEAGN6I6JUAKGXNW"),
    ("wealth_score", "IEAGN6I6JUAKGXNX"),
    ("relative_wealth_score", "IEAGN6I6JUAKGXNZ"),
    ("relative_enrollment_score", "IEAGN6I6JUAKDM2H"),
    ("relative_enrollment_score_plus", "IEAGN6I6JUAKGXOL"),
    // Zoning / K-12 status
    ("zoning", "IEAGN6I6JUAJA4QQ"),
    ("k12_status", "IEAGN6I6JUAKGXNY"),
    // School
    ("school_type", "IEAGN6I6JUAITZSN"),
    ("overall_site_stage", "IEAGN6I6JUAJU2PJ"),
    // Other
    ("site_poc", "IEAGN6I6JUAKEKBU"),
    ("p1_accountable", "IEAGN6I6JUAJK2MQ"),
    ("loi_signed_date", "IEAGN6I6JUAIOUVH"),
    ("vendor_team", "IEAGN6I6JUAKDCYE"),
    ("google_folder", "IEAGN6I6JUAIKGJH"),
];

static RECORD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{8,16}$").expect("valid record id regex"));
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));

/// Wrike id of a named custom field.
pub fn custom_field_id(name: &str) -> Option<&'static str> {
    CUSTOM_FIELDS
        .iter()
        .find(|(field_name, _)| *field_name == name)
        .map(|(_, id)| *id)
}

/// Human-readable name of a custom field id.
pub fn custom_field_name(id: &str) -> Option<&'static str> {
    CUSTOM_FIELDS
        .iter()
        .find(|(_, field_id)| *field_id == id)
        .map(|(name, _)| *name)
}

/// A project record in Wrike (a folder or project carrying custom fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_item_type_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub id: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCustomField {
    pub name: String,
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchoolType {
    #[serde(rename = "micro")]
    Micro,
    #[serde(rename = "250")]
    Growth250,
    #[serde(rename = "1000")]
    Flagship1000,
}

/// The DD-relevant view of a Site Record handed back to agents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub id: String,
    pub title: String,
    pub address: Option<String>,
    pub school_type: Option<SchoolType>,
    pub stage: Option<String>,
    pub drive_folder_url: Option<String>,
    pub custom_fields: Vec<NamedCustomField>,
    pub permalink: Option<String>,
    pub description: String,
}

impl SiteRecord {
    /// String value of a named custom field, if present and textual.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        let field_id = custom_field_id(name)?;
        self.custom_fields
            .iter()
            .filter(|field| field.id == field_id)
            .find_map(|field| field.value.as_str())
    }

    pub fn is_site_record(&self, site_record_type_id: &str) -> bool {
        self.custom_item_type_id.as_deref() == Some(site_record_type_id)
    }
}

pub fn enrich_custom_fields(record: &SiteRecord) -> Vec<NamedCustomField> {
    record
        .custom_fields
        .iter()
        .map(|field| NamedCustomField {
            name: custom_field_name(&field.id)
                .map(str::to_string)
                .unwrap_or_else(|| field.id.clone()),
            id: field.id.clone(),
            value: field.value.clone(),
        })
        .collect()
}

/// Address with any rich-text markup removed.
pub fn extract_address(record: &SiteRecord) -> Option<String> {
    let raw = record.field_str("address")?;
    let address = HTML_TAG_RE.replace_all(raw, "").trim().to_string();
    (!address.is_empty()).then_some(address)
}

pub fn extract_school_type(record: &SiteRecord) -> Option<SchoolType> {
    let field_id = custom_field_id("school_type")?;
    record
        .custom_fields
        .iter()
        .filter(|field| field.id == field_id)
        .filter_map(|field| field.value.as_str())
        .find_map(normalize_school_type)
}

fn normalize_school_type(value: &str) -> Option<SchoolType> {
    if value.contains("Microschool 25") || value.contains("Micro") {
        Some(SchoolType::Micro)
    } else if value.contains("Growth 250") || value == "250" {
        Some(SchoolType::Growth250)
    } else if value.contains("Flagship 1000") || value == "1000" {
        Some(SchoolType::Flagship1000)
    } else {
        None
    }
}

pub fn extract_google_folder(record: &SiteRecord) -> Option<String> {
    let value = record.field_str("google_folder")?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn extract_stage(record: &SiteRecord) -> Option<String> {
    record.field_str("overall_site_stage").map(str::to_string)
}

pub fn build_site_summary(record: &SiteRecord) -> SiteSummary {
    SiteSummary {
        id: record.id.clone(),
        title: record.title.clone(),
        address: extract_address(record),
        school_type: extract_school_type(record),
        stage: extract_stage(record),
        drive_folder_url: extract_google_folder(record),
        custom_fields: enrich_custom_fields(record),
        permalink: record.permalink.clone(),
        description: record.description.clone().unwrap_or_default(),
    }
}

/// Wrike ids are 8-16 uppercase alphanumerics.
pub fn looks_like_record_id(value: &str) -> bool {
    RECORD_ID_RE.is_match(value.trim())
}

pub fn looks_like_permalink(value: &str) -> bool {
    value.to_lowercase().contains("wrike.com")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> SiteRecord {
        serde_json::from_value(json!({
            "id": "IEAGN6I6ABCDEFGH",
            "title": "Alpha Austin Demo",
            "permalink": "https://www.wrike.com/open.htm?id=123",
            "customItemTypeId": DEFAULT_SITE_RECORD_TYPE_ID,
            "customFields": fields
        }))
        .unwrap()
    }

    #[test]
    fn address_strips_markup_and_whitespace() {
        let rec = record(json!([
            { "id": "IEAGN6I6JUAIKSH3", "value": " <p>123 Main St, <b>Austin</b></p> " }
        ]));
        assert_eq!(extract_address(&rec).as_deref(), Some("123 Main St, Austin"));
    }

    #[test]
    fn address_that_is_only_markup_is_none() {
        let rec = record(json!([{ "id": "IEAGN6I6JUAIKSH3", "value": "<br/>" }]));
        assert_eq!(extract_address(&rec), None);
    }

    #[test]
    fn school_type_normalizes_known_labels() {
        let cases = [
            ("Microschool 25", Some(SchoolType::Micro)),
            ("Micro (legacy)", Some(SchoolType::Micro)),
            ("Growth 250", Some(SchoolType::Growth250)),
            ("250", Some(SchoolType::Growth250)),
            ("Flagship 1000", Some(SchoolType::Flagship1000)),
            ("1000", Some(SchoolType::Flagship1000)),
            ("Campus 500", None),
        ];
        for (raw, expected) in cases {
            let rec = record(json!([{ "id": "IEAGN6I6JUAITZSN", "value": raw }]));
            assert_eq!(extract_school_type(&rec), expected, "value {raw:?}");
        }
    }

    #[test]
    fn school_type_serializes_to_short_codes() {
        assert_eq!(json!(SchoolType::Micro), json!("micro"));
        assert_eq!(json!(SchoolType::Growth250), json!("250"));
        assert_eq!(json!(SchoolType::Flagship1000), json!("1000"));
    }

    #[test]
    fn google_folder_blank_is_none() {
        let rec = record(json!([{ "id": "IEAGN6I6JUAIKGJH", "value": "   " }]));
        assert_eq!(extract_google_folder(&rec), None);
    }

    #[test]
    fn enrichment_names_known_fields_and_keeps_unknown_ids() {
        let rec = record(json!([
            { "id": "IEAGN6I6JUAJU2PJ", "value": "Due Diligence" },
            { "id": "UNKNOWNFIELD0001", "value": 42 }
        ]));
        let fields = enrich_custom_fields(&rec);
        assert_eq!(fields[0].name, "overall_site_stage");
        assert_eq!(fields[1].name, "UNKNOWNFIELD0001");
        assert_eq!(fields[1].value, json!(42));
    }

    #[test]
    fn summary_collects_dd_fields() {
        let rec = record(json!([
            { "id": "IEAGN6I6JUAIKSH3", "value": "1 Congress Ave" },
            { "id": "IEAGN6I6JUAITZSN", "value": "Growth 250" },
            { "id": "IEAGN6I6JUAJU2PJ", "value": "LOI" },
            { "id": "IEAGN6I6JUAIKGJH", "value": " https://drive.google.com/drive/folders/abc " }
        ]));
        let summary = build_site_summary(&rec);
        assert_eq!(summary.title, "Alpha Austin Demo");
        assert_eq!(summary.address.as_deref(), Some("1 Congress Ave"));
        assert_eq!(summary.school_type, Some(SchoolType::Growth250));
        assert_eq!(summary.stage.as_deref(), Some("LOI"));
        assert_eq!(
            summary.drive_folder_url.as_deref(),
            Some("https://drive.google.com/drive/folders/abc")
        );
        assert_eq!(summary.description, "");
        assert_eq!(summary.custom_fields.len(), 4);
    }

    #[test]
    fn record_id_detection() {
        assert!(looks_like_record_id("IEAGN6I6ABCDEFGH"));
        assert!(looks_like_record_id("  MAAAAAAB  "));
        assert!(!looks_like_record_id("Alpha Austin"));
        assert!(!looks_like_record_id("ieagn6i6abcdefgh"));
        assert!(!looks_like_record_id("SHORT1"));
        assert!(!looks_like_record_id("ABCDEFGHIJKLMNOPQ"));
    }

    #[test]
    fn permalink_detection_is_case_insensitive() {
        assert!(looks_like_permalink("https://www.Wrike.com/open.htm?id=1"));
        assert!(!looks_like_permalink("Alpha Austin"));
    }
}
