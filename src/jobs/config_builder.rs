//! Turns a submitted test document into the config Taurus actually runs.
//!
//! JSON and YAML both parse into a `serde_json::Value` tree so the transform
//! is format-agnostic; the output is written back in the input's format.

use serde_json::{Map, Value, json};

use crate::error::JobError;
use crate::jobs::model::MediaType;

/// Modules whose output would pollute the captured result.
const DISABLED_MODULES: &[&str] = &["console", "final-stats", "functional-consolidator"];

/// Parse a submitted document, requiring a mapping at the root.
pub fn parse_document(body: &[u8], media_type: MediaType) -> Result<Map<String, Value>, JobError> {
    let malformed = |reason: String| JobError::MalformedDocument {
        media_type: media_type.to_string(),
        reason,
    };

    let tree: Value = match media_type {
        MediaType::Json => serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?,
        MediaType::Yaml => serde_yaml::from_slice(body).map_err(|e| malformed(e.to_string()))?,
    };

    match tree {
        Value::Object(root) => Ok(root),
        other => Err(malformed(format!(
            "expected a mapping at the document root, found {}",
            kind(&other)
        ))),
    }
}

/// Build the execution config for a submitted document.
pub fn build_config(body: &[u8], media_type: MediaType) -> Result<Vec<u8>, JobError> {
    let mut root = parse_document(body, media_type)?;
    force_settings(&mut root);

    let tree = Value::Object(root);
    let encoded = match media_type {
        MediaType::Json => serde_json::to_vec(&tree).map_err(|e| e.to_string()),
        MediaType::Yaml => serde_yaml::to_string(&to_yaml(&tree))
            .map(String::into_bytes)
            .map_err(|e| e.to_string()),
    };
    encoded.map_err(|reason| JobError::MalformedDocument {
        media_type: media_type.to_string(),
        reason,
    })
}

/// Overwrite the fields the service controls. Caller values at these paths
/// are discarded.
fn force_settings(root: &mut Map<String, Value>) {
    root.insert(
        "settings".to_string(),
        json!({ "check-updates": false, "check-interval": "10s" }),
    );

    let modules = root
        .entry("modules")
        .or_insert_with(|| Value::Object(Map::new()));
    if !modules.is_object() {
        *modules = Value::Object(Map::new());
    }
    if let Value::Object(modules) = modules {
        for name in DISABLED_MODULES {
            let module = modules
                .entry(name.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match module {
                Value::Object(settings) => {
                    settings.insert("disable".to_string(), Value::Bool(true));
                }
                other => *other = json!({ "disable": true }),
            }
        }
    }

    root.insert(
        "provisioning".to_string(),
        Value::String("local".to_string()),
    );
}

/// Re-home the tree in YAML's value model. JSON numbers keep their exact
/// text in `serde_json`, which only its own serializer understands.
fn to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                serde_yaml::Value::Number(u.into())
            } else if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_yaml::Value::Number(f.into())
            } else {
                serde_yaml::Value::String(n.to_string())
            }
        }
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(items) => serde_yaml::Value::Sequence(items.iter().map(to_yaml).collect()),
        Value::Object(map) => serde_yaml::Value::Mapping(
            map.iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), to_yaml(v)))
                .collect(),
        ),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_forced(tree: &Value) {
        assert_eq!(tree["settings"]["check-updates"], false);
        assert_eq!(tree["settings"]["check-interval"], "10s");
        assert_eq!(tree["modules"]["console"]["disable"], true);
        assert_eq!(tree["modules"]["final-stats"]["disable"], true);
        assert_eq!(tree["modules"]["functional-consolidator"]["disable"], true);
        assert_eq!(tree["provisioning"], "local");
    }

    #[test]
    fn json_keeps_extra_fields_and_forces_settings() {
        let body = br#"{"execution":[{"executor":"jmeter","concurrency":5}],"reporting":[{"module":"passfail"}]}"#;
        let out = build_config(body, MediaType::Json).unwrap();
        let tree: Value = serde_json::from_slice(&out).unwrap();

        assert_forced(&tree);
        assert_eq!(tree["execution"][0]["executor"], "jmeter");
        assert_eq!(tree["execution"][0]["concurrency"], 5);
        assert_eq!(tree["reporting"][0]["module"], "passfail");
    }

    #[test]
    fn caller_values_at_forced_paths_are_overwritten() {
        let body = br#"{
            "settings": {"check-updates": true, "default-executor": "gatling"},
            "modules": {"console": {"disable": false, "screen": "gui"}, "jmeter": {"version": "5.5"}},
            "provisioning": "cloud"
        }"#;
        let out = build_config(body, MediaType::Json).unwrap();
        let tree: Value = serde_json::from_slice(&out).unwrap();

        assert_forced(&tree);
        assert!(tree["settings"].get("default-executor").is_none());
        assert_eq!(tree["modules"]["console"]["screen"], "gui");
        assert_eq!(tree["modules"]["jmeter"]["version"], "5.5");
    }

    #[test]
    fn non_mapping_modules_are_replaced() {
        let body = br#"{"modules": ["console"], "execution": []}"#;
        let out = build_config(body, MediaType::Json).unwrap();
        let tree: Value = serde_json::from_slice(&out).unwrap();
        assert_forced(&tree);
    }

    #[test]
    fn yaml_in_yaml_out() {
        let body = b"execution:\n- executor: locust\n  scenario: smoke\nscenarios:\n  smoke:\n    script: locustfile.py\n";
        let out = build_config(body, MediaType::Yaml).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(serde_json::from_str::<Value>(&text).is_err());
        let tree: Value = serde_yaml::from_str(&text).unwrap();
        assert_forced(&tree);
        assert_eq!(tree["execution"][0]["executor"], "locust");
        assert_eq!(tree["scenarios"]["smoke"]["script"], "locustfile.py");
    }

    #[test]
    fn json_numbers_keep_their_exact_text() {
        let body = br#"{"seed": 123456789012345678901234567890, "ratio": 0.1000000000000000055511151231257827}"#;
        let out = String::from_utf8(build_config(body, MediaType::Json).unwrap()).unwrap();

        assert!(out.contains(r#""seed":123456789012345678901234567890"#), "{out}");
        assert!(out.contains(r#""ratio":0.1000000000000000055511151231257827"#), "{out}");
    }

    #[test]
    fn yaml_numbers_stay_plain_scalars() {
        let body = b"execution:\n- concurrency: 10\n  ramp-up: -3\n  hold-for: 1.5\n";
        let out = String::from_utf8(build_config(body, MediaType::Yaml).unwrap()).unwrap();

        assert!(out.contains("concurrency: 10"), "{out}");
        assert!(out.contains("ramp-up: -3"), "{out}");
        assert!(out.contains("hold-for: 1.5"), "{out}");
        assert!(!out.contains("serde_json"), "{out}");
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = build_config(b"{\"execution\": [", MediaType::Json).unwrap_err();
        assert!(matches!(err, JobError::MalformedDocument { .. }));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = build_config(b"execution: [unterminated", MediaType::Yaml).unwrap_err();
        assert!(matches!(err, JobError::MalformedDocument { .. }));
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        assert!(parse_document(b"[1, 2, 3]", MediaType::Json).is_err());
        assert!(parse_document(b"just a string", MediaType::Yaml).is_err());
        assert!(parse_document(b"", MediaType::Yaml).is_err());
    }
}
