//! Wire form for export/import.
//!
//! In memory, timestamps are native `DateTime<Utc>` values; on the wire they
//! are ISO-8601 strings at millisecond precision. Untrusted import payloads
//! are validated against the fixed schema before anything reaches the store —
//! a malformed payload is rejected wholesale, never partially recovered.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::JournalEntry;

/// The single supported export schema version.
pub const EXPORT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: u64,
    pub entries: Vec<WireEntry>,
}

/// JSON-safe entry representation, camelCase to match the export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    pub id: String,
    pub content: String,
    pub summary: Option<String>,
    pub reflection_questions: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Import payload rejected; carries a description of the first mismatch.
#[derive(Error, Debug)]
#[error("Invalid export payload: {0}")]
pub struct ValidationError(pub String);

pub fn serialize_entry(entry: &JournalEntry) -> WireEntry {
    WireEntry {
        id: entry.id.clone(),
        content: entry.content.clone(),
        summary: entry.summary.clone(),
        reflection_questions: entry.reflection_questions.clone(),
        created_at: to_wire_timestamp(entry.created_at),
        updated_at: to_wire_timestamp(entry.updated_at),
    }
}

/// Inverse of `serialize_entry`. Only timestamp parsing can fail, and a
/// payload that passed `validate_export_payload` never does.
pub fn deserialize_entry(wire: &WireEntry) -> Result<JournalEntry, ValidationError> {
    Ok(JournalEntry {
        id: wire.id.clone(),
        content: wire.content.clone(),
        summary: wire.summary.clone(),
        reflection_questions: wire.reflection_questions.clone(),
        created_at: parse_wire_timestamp(&wire.created_at, "createdAt")?,
        updated_at: parse_wire_timestamp(&wire.updated_at, "updatedAt")?,
    })
}

fn to_wire_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_wire_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, ValidationError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|_| ValidationError(format!("{field} is not a valid ISO-8601 timestamp: {raw:?}")))
}

/// Check an untrusted payload against the fixed export schema. The version
/// tag is checked before any entry is inspected; the first mismatch aborts.
pub fn validate_export_payload(raw: &Value) -> Result<ExportPayload, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError("payload must be a JSON object".to_string()))?;

    let version = obj
        .get("version")
        .ok_or_else(|| ValidationError("missing \"version\" field".to_string()))?
        .as_u64()
        .ok_or_else(|| ValidationError("\"version\" must be a number".to_string()))?;
    if version != EXPORT_VERSION {
        return Err(ValidationError(format!(
            "unsupported version: expected {EXPORT_VERSION}, got {version}"
        )));
    }

    let entries = obj
        .get("entries")
        .ok_or_else(|| ValidationError("missing \"entries\" field".to_string()))?
        .as_array()
        .ok_or_else(|| ValidationError("\"entries\" must be an array".to_string()))?;

    let mut validated = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        validated.push(validate_wire_entry(entry, i)?);
    }

    Ok(ExportPayload {
        version,
        entries: validated,
    })
}

fn validate_wire_entry(raw: &Value, index: usize) -> Result<WireEntry, ValidationError> {
    let at = |field: &str| format!("entries[{index}].{field}");

    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError(format!("entries[{index}] must be an object")))?;

    let required_string = |field: &str| -> Result<String, ValidationError> {
        obj.get(field)
            .ok_or_else(|| ValidationError(format!("{} is missing", at(field))))?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ValidationError(format!("{} must be a string", at(field))))
    };

    let id = required_string("id")?;
    let content = required_string("content")?;

    let summary = match obj.get("summary") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(ValidationError(format!(
                "{} must be a string or null",
                at("summary")
            )));
        }
    };

    let reflection_questions = match obj.get("reflectionQuestions") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut questions = Vec::with_capacity(items.len());
            for (j, item) in items.iter().enumerate() {
                let q = item.as_str().ok_or_else(|| {
                    ValidationError(format!(
                        "entries[{index}].reflectionQuestions[{j}] must be a string"
                    ))
                })?;
                questions.push(q.to_string());
            }
            Some(questions)
        }
        Some(_) => {
            return Err(ValidationError(format!(
                "{} must be an array of strings or null",
                at("reflectionQuestions")
            )));
        }
    };

    let created_at = required_string("createdAt")?;
    parse_wire_timestamp(&created_at, &at("createdAt"))?;
    let updated_at = required_string("updatedAt")?;
    parse_wire_timestamp(&updated_at, &at("updatedAt"))?;

    Ok(WireEntry {
        id,
        content,
        summary,
        reflection_questions,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_entry_id, now_ms};
    use serde_json::json;

    fn sample_entry() -> JournalEntry {
        JournalEntry {
            id: new_entry_id(),
            content: "Today was long.".to_string(),
            summary: Some("You had a long day.".to_string()),
            reflection_questions: Some(vec![
                "What made it feel long?".to_string(),
                "What would have helped?".to_string(),
            ]),
            created_at: now_ms(),
            updated_at: now_ms(),
        }
    }

    fn valid_payload() -> Value {
        json!({
            "version": 1,
            "entries": [{
                "id": "abc-123",
                "content": "hello",
                "summary": null,
                "reflectionQuestions": ["Why hello?"],
                "createdAt": "2024-05-01T12:00:00.000Z",
                "updatedAt": "2024-05-01T12:30:00.250Z"
            }]
        })
    }

    #[test]
    fn test_round_trip_identity_at_millisecond_precision() {
        let entry = sample_entry();
        let restored = deserialize_entry(&serialize_entry(&entry)).unwrap();
        assert_eq!(restored, entry);
    }

    #[test]
    fn test_round_trip_with_absent_enrichment() {
        let entry = JournalEntry {
            summary: None,
            reflection_questions: None,
            ..sample_entry()
        };
        let wire = serialize_entry(&entry);
        assert_eq!(wire.summary, None);
        assert_eq!(deserialize_entry(&wire).unwrap(), entry);
    }

    #[test]
    fn test_wire_timestamps_are_iso_8601_millis() {
        let entry = sample_entry();
        let wire = serialize_entry(&entry);
        assert!(wire.created_at.ends_with('Z'));
        // "2024-05-01T12:00:00.000Z" — exactly three fractional digits.
        let frac = wire.created_at.split('.').nth(1).unwrap();
        assert_eq!(frac.len(), 4); // "000Z"
    }

    #[test]
    fn test_wire_entry_uses_camel_case_keys() {
        let wire = serialize_entry(&sample_entry());
        let value = serde_json::to_value(&wire).unwrap();
        assert!(value.get("reflectionQuestions").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("reflection_questions").is_none());
    }

    #[test]
    fn test_validate_accepts_valid_payload() {
        let payload = validate_export_payload(&valid_payload()).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.entries.len(), 1);
        assert_eq!(payload.entries[0].content, "hello");
        assert_eq!(
            payload.entries[0].reflection_questions,
            Some(vec!["Why hello?".to_string()])
        );
    }

    #[test]
    fn test_validate_rejects_wrong_version() {
        let mut payload = valid_payload();
        payload["version"] = json!(2);
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("expected 1, got 2"), "{err}");
    }

    #[test]
    fn test_validate_rejects_missing_content() {
        let mut payload = valid_payload();
        payload["entries"][0].as_object_mut().unwrap().remove("content");
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("entries[0].content"), "{err}");
    }

    #[test]
    fn test_validate_rejects_string_reflection_questions() {
        let mut payload = valid_payload();
        payload["entries"][0]["reflectionQuestions"] = json!("not a list");
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(
            err.to_string().contains("reflectionQuestions"),
            "{err}"
        );
    }

    #[test]
    fn test_validate_rejects_non_string_question_item() {
        let mut payload = valid_payload();
        payload["entries"][0]["reflectionQuestions"] = json!(["fine", 7]);
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("reflectionQuestions[1]"), "{err}");
    }

    #[test]
    fn test_validate_rejects_bad_timestamp() {
        let mut payload = valid_payload();
        payload["entries"][0]["createdAt"] = json!("last tuesday");
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("createdAt"), "{err}");
    }

    #[test]
    fn test_validate_rejects_non_object_payload() {
        let err = validate_export_payload(&json!([1, 2, 3])).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_validate_checks_version_before_entries() {
        // Entries are garbage, but the version mismatch must win.
        let payload = json!({ "version": 9, "entries": "garbage" });
        let err = validate_export_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("unsupported version"), "{err}");
    }
}
