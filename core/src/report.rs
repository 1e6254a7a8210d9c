use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

/// Flatten nested report data into `dotted.key -> text` pairs.
///
/// `{"q1": {"rating": 4}}` becomes `{"q1.rating": "4"}`. Arrays are joined with
/// newlines, nulls become empty strings, and strings are taken verbatim.
pub fn flatten_report_data(data: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(data, "", &mut out);
    out
}

fn flatten_into(data: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (key, value) in data {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &full_key, out),
            Value::Array(items) => {
                let joined = items.iter().map(scalar_text).collect::<Vec<_>>().join("\n");
                out.insert(full_key, joined);
            }
            other => {
                out.insert(full_key, scalar_text(other));
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Wrap a placeholder key in its template delimiters.
pub fn placeholder_token(key: &str) -> String {
    format!("{{{{{key}}}}}")
}

/// Google Docs `replaceAllText` requests, one per placeholder.
pub fn build_replace_all_text_requests(replacements: &BTreeMap<String, String>) -> Vec<Value> {
    replacements
        .iter()
        .map(|(key, value)| {
            json!({
                "replaceAllText": {
                    "containsText": {
                        "text": placeholder_token(key),
                        "matchCase": true
                    },
                    "replaceText": value
                }
            })
        })
        .collect()
}

/// `"<site> DD Report - MM/DD/YYYY"`
pub fn report_document_name(site_name: &str, report_date: &str) -> String {
    format!("{} DD Report - {}", site_name.trim(), report_date)
}

/// Convenience placeholders every template may use. Values already supplied
/// in the report data win.
pub fn apply_default_placeholders(
    replacements: &mut BTreeMap<String, String>,
    site_name: &str,
    report_date: &str,
    doc_url: &str,
) {
    for (key, value) in [
        ("site_name", site_name.trim()),
        ("report_date", report_date),
        ("doc_url", doc_url),
    ] {
        replacements
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn flatten_joins_nested_keys_with_dots() {
        let flat = flatten_report_data(&obj(json!({
            "meta": { "prepared_by": "Ops", "version": 2 },
            "q1": { "rating": "Green", "detail": { "zoning": "By right" } }
        })));
        assert_eq!(flat["meta.prepared_by"], "Ops");
        assert_eq!(flat["meta.version"], "2");
        assert_eq!(flat["q1.rating"], "Green");
        assert_eq!(flat["q1.detail.zoning"], "By right");
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn flatten_stringifies_scalars_lists_and_nulls() {
        let flat = flatten_report_data(&obj(json!({
            "risks": ["Flood zone", "Parking", 3],
            "notes": null,
            "approved": true,
            "score": 7.5,
            "empty": {}
        })));
        assert_eq!(flat["risks"], "Flood zone\nParking\n3");
        assert_eq!(flat["notes"], "");
        assert_eq!(flat["approved"], "true");
        assert_eq!(flat["score"], "7.5");
        assert!(!flat.contains_key("empty"));
    }

    #[test]
    fn replace_requests_wrap_keys_in_braces() {
        let mut map = BTreeMap::new();
        map.insert("q1.rating".to_string(), "Green".to_string());
        let requests = build_replace_all_text_requests(&map);
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            json!({
                "replaceAllText": {
                    "containsText": { "text": "{{q1.rating}}", "matchCase": true },
                    "replaceText": "Green"
                }
            })
        );
    }

    #[test]
    fn defaults_do_not_override_supplied_values() {
        let mut map = flatten_report_data(&obj(json!({ "site_name": "Custom Name" })));
        apply_default_placeholders(&mut map, "  Alpha Austin ", "03/04/2026", "https://doc");
        assert_eq!(map["site_name"], "Custom Name");
        assert_eq!(map["report_date"], "03/04/2026");
        assert_eq!(map["doc_url"], "https://doc");
    }

    #[test]
    fn document_name_trims_site() {
        assert_eq!(
            report_document_name(" Alpha Austin ", "01/02/2026"),
            "Alpha Austin DD Report - 01/02/2026"
        );
    }
}
