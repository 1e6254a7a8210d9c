use serde_json::{Value, json};

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn print_json(value: &Value) {
    println!("{}", to_pretty_json(value));
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty_json(&err));
    std::process::exit(4);
}

/// Parse a JSON argument given inline, as `@path`, or as `@-` for stdin.
pub fn read_json_arg(raw: &str) -> Result<Value, String> {
    let (source, text) = match raw.strip_prefix('@') {
        Some("-") => {
            let text = std::io::read_to_string(std::io::stdin())
                .map_err(|e| format!("Failed to read stdin: {e}"))?;
            ("stdin".to_string(), text)
        }
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read file '{path}': {e}"))?;
            (format!("'{path}'"), text)
        }
        None => ("argument".to_string(), raw.to_string()),
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in {source}: {e}"))
}

/// Exit codes: 0=success, 1=missing resource or setup, 2=upstream failure,
///             3=connection error, 4=usage error
pub fn exit_code_for_envelope(envelope: &Value) -> i32 {
    if envelope.get("status").and_then(Value::as_str) == Some("complete") {
        return 0;
    }
    match envelope
        .pointer("/error/error")
        .and_then(Value::as_str)
        .unwrap_or_default()
    {
        "validation_failed" | "unknown_tool" => 4,
        "connection_error" => 3,
        "not_found" | "config_missing" | "auth_missing" => 1,
        _ => 2,
    }
}
