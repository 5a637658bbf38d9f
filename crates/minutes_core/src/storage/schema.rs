//! Shape repair for minutes files.
//!
//! Files carry no schema version. Compatibility comes from defaulting each
//! section independently, so older and newer files both load.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{
    decode_entries, Attendee, DateMode, Document, Meeting, Settings, SETTINGS_ID,
};

pub const DEFAULT_FILE_NAME: &str = "meeting-minutes.json";

const RECOGNIZED_KEYS: [&str; 4] = ["settings", "attendees", "meetings", "draft"];

/// True when `value` looks like a minutes document rather than foreign JSON.
pub fn is_recognized(value: &Value) -> bool {
    value
        .as_object()
        .map(|object| RECOGNIZED_KEYS.iter().any(|key| object.contains_key(*key)))
        .unwrap_or(false)
}

/// Parses raw file text, falling back to `Document::default()` for empty,
/// unparseable or foreign content.
pub fn parse_document(raw: &str) -> Document {
    let defaults = Document::default();
    if raw.trim().is_empty() {
        return defaults;
    }

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "minutes file is not valid JSON, starting from defaults");
            return defaults;
        }
    };

    if !is_recognized(&value) {
        warn!("minutes file holds unrelated JSON, starting from defaults");
        return defaults;
    }

    reconcile(&value, &defaults)
}

/// Merges a partially valid document over `defaults`, one section at a time.
pub fn reconcile(partial: &Value, defaults: &Document) -> Document {
    let Some(object) = partial.as_object() else {
        return defaults.clone();
    };

    let settings = match object.get("settings") {
        Some(Value::Object(fields)) => merge_settings(fields, &defaults.settings),
        Some(_) => {
            warn!("settings section is not an object, using defaults");
            defaults.settings.clone()
        }
        None => defaults.settings.clone(),
    };

    let attendees = match object.get("attendees") {
        Some(value) => decode_entries::<Attendee>(value, "attendees"),
        None => defaults.attendees.clone(),
    };

    let meetings = match object.get("meetings") {
        Some(value) => decode_entries::<Meeting>(value, "meetings"),
        None => defaults.meetings.clone(),
    };

    let draft = match object.get("draft") {
        None => defaults.draft.clone(),
        Some(Value::Null) => None,
        Some(value) if !value.is_object() => {
            warn!("draft section is not an object, dropping it");
            None
        }
        Some(value) => match serde_json::from_value::<Meeting>(value.clone()) {
            Ok(meeting) => Some(meeting),
            Err(error) => {
                warn!(%error, "draft section is malformed, dropping it");
                None
            }
        },
    };

    Document {
        settings,
        attendees,
        meetings,
        draft,
    }
}

fn merge_settings(fields: &Map<String, Value>, defaults: &Settings) -> Settings {
    let mut settings = defaults.clone();
    settings.id = SETTINGS_ID.to_string();

    if let Some(mode) = field::<DateMode>(fields, "dateMode") {
        settings.date_mode = mode;
    }
    if let Some(logo) = field::<Option<String>>(fields, "logoDataUrl") {
        settings.logo_data_url = logo;
    }
    if let Some(color) = field::<String>(fields, "pdfAccentColor") {
        settings.pdf_accent_color = color;
    }
    if let Some(color) = field::<String>(fields, "pdfBgColor") {
        settings.pdf_bg_color = color;
    }

    settings
}

fn field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            warn!(key, %error, "ignoring invalid settings field");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgendaPoint, AgendaStatus, DRAFT_ID};
    use serde_json::json;

    fn sample_meeting(id: &str, finalized_at: i64) -> Meeting {
        Meeting {
            id: id.to_string(),
            finalized_at,
            date: "2026-03-02".to_string(),
            agenda_points: vec![AgendaPoint {
                title: "Release plan".to_string(),
                description: "Agree on the cut-off".to_string(),
                assignee: Some("Ada Lovelace".to_string()),
                deadline: Some("2026-03-09".to_string()),
                status: AgendaStatus::Resolved,
            }],
            attendees: vec![Attendee {
                name: "Ada".to_string(),
                surname: "Lovelace".to_string(),
                company: "Analytical".to_string(),
            }],
        }
    }

    const BROWSER_FILE: &str = r##"{
  "settings": {
    "id": "app",
    "dateMode": "calendarWeek",
    "logoDataUrl": null,
    "pdfAccentColor": "#0f766e",
    "pdfBgColor": "#f8fafc",
    "theme": "dark"
  },
  "attendees": [
    { "name": "Ada", "surname": "Lovelace", "company": "Analytical" },
    { "name": "Grace", "surname": null, "company": null, "email": "grace@example.com" }
  ],
  "meetings": [
    {
      "id": "3f2b9c1e-0d5c-4f55-9d51-2a7d0c1e9b10",
      "finalizedAt": 1712345678901.0,
      "date": "2024-04-05",
      "agendaPoints": [
        { "title": "Budget", "description": null, "assignee": "Ada Lovelace", "deadline": null, "status": "open", "collapsed": true },
        { "title": "Hiring", "description": "Two roles", "assignee": null, "deadline": "2024-04-19", "status": "resolved" }
      ],
      "attendees": [{ "name": "Ada", "surname": "Lovelace", "company": "Analytical" }],
      "notes": ""
    },
    {
      "id": "9a0c6d7e-5b1f-4c3e-8f2a-71b4d2e6c0aa",
      "finalizedAt": 1709999999999,
      "date": null,
      "agendaPoints": [],
      "attendees": []
    }
  ],
  "draft": {
    "id": "draft",
    "finalizedAt": null,
    "date": "2024-04-12",
    "agendaPoints": [{ "title": "Follow-ups", "description": "", "assignee": null, "deadline": null, "status": "blocked" }],
    "attendees": [{ "name": "Grace", "surname": null, "company": "Navy" }]
  }
}"##;

    #[test]
    fn browser_written_file_keeps_every_meeting_and_draft() {
        let document = parse_document(BROWSER_FILE);

        assert_eq!(document.settings.date_mode, DateMode::CalendarWeek);
        assert_eq!(document.settings.pdf_accent_color, "#0f766e");
        assert_eq!(document.attendees.len(), 2);
        assert_eq!(document.attendees[1].surname, "");

        assert_eq!(document.meetings.len(), 2);
        let first = &document.meetings[0];
        assert_eq!(first.finalized_at, 1_712_345_678_901);
        assert_eq!(first.agenda_points.len(), 2);
        assert_eq!(first.agenda_points[0].description, "");
        assert_eq!(first.agenda_points[0].assignee.as_deref(), Some("Ada Lovelace"));
        assert_eq!(first.agenda_points[1].status, AgendaStatus::Resolved);
        assert_eq!(document.meetings[1].date, "");

        let draft = document.draft.as_ref().expect("draft survives the load");
        assert_eq!(draft.id, DRAFT_ID);
        assert_eq!(draft.agenda_points[0].status, AgendaStatus::Blocked);
        assert_eq!(draft.attendees[0].company, "Navy");

        let rewritten = serde_json::to_string_pretty(&document).unwrap();
        assert_eq!(parse_document(&rewritten), document);
    }

    #[test]
    fn empty_and_blank_text_yield_defaults() {
        assert_eq!(parse_document(""), Document::default());
        assert_eq!(parse_document("  \n\t"), Document::default());
    }

    #[test]
    fn invalid_json_yields_defaults() {
        assert_eq!(parse_document("{\"settings\": "), Document::default());
        assert_eq!(parse_document("not json at all"), Document::default());
    }

    #[test]
    fn foreign_json_yields_defaults() {
        assert_eq!(parse_document("{\"foo\":1}"), Document::default());
        assert_eq!(parse_document("[1, 2, 3]"), Document::default());
        assert_eq!(parse_document("42"), Document::default());
        assert_eq!(parse_document("null"), Document::default());
    }

    #[test]
    fn is_recognized_needs_one_known_key() {
        assert!(is_recognized(&json!({ "draft": null })));
        assert!(is_recognized(&json!({ "meetings": "oops", "other": 1 })));
        assert!(!is_recognized(&json!({ "foo": 1 })));
        assert!(!is_recognized(&json!([{ "settings": {} }])));
    }

    #[test]
    fn settings_merge_over_defaults() {
        let document = parse_document(r#"{"settings":{"dateMode":"calendarWeek"}}"#);

        assert_eq!(document.settings.date_mode, DateMode::CalendarWeek);
        assert_eq!(
            document.settings,
            Settings {
                date_mode: DateMode::CalendarWeek,
                ..Settings::default()
            }
        );
        assert!(document.attendees.is_empty());
        assert!(document.meetings.is_empty());
        assert_eq!(document.draft, None);
    }

    #[test]
    fn invalid_settings_fields_keep_defaults() {
        let document = reconcile(
            &json!({
                "settings": {
                    "id": "something-else",
                    "dateMode": "fortnight",
                    "pdfAccentColor": 12,
                    "pdfBgColor": "#000000",
                    "logoDataUrl": "data:image/png;base64,AAAA"
                }
            }),
            &Document::default(),
        );

        assert_eq!(document.settings.id, SETTINGS_ID);
        assert_eq!(document.settings.date_mode, DateMode::Exact);
        assert_eq!(document.settings.pdf_accent_color, "#1f4e79");
        assert_eq!(document.settings.pdf_bg_color, "#000000");
        assert_eq!(
            document.settings.logo_data_url.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn non_list_sections_become_empty() {
        let defaults = Document {
            attendees: vec![Attendee::default()],
            ..Document::default()
        };
        let document = reconcile(
            &json!({ "attendees": { "name": "Ada" }, "meetings": 3 }),
            &defaults,
        );

        assert!(document.attendees.is_empty());
        assert!(document.meetings.is_empty());
    }

    #[test]
    fn malformed_list_entries_are_dropped() {
        let document = reconcile(
            &json!({
                "attendees": [
                    { "name": "Ada", "surname": "Lovelace", "company": "Analytical" },
                    "Grace Hopper",
                    { "name": "Linus" }
                ]
            }),
            &Document::default(),
        );

        assert_eq!(document.attendees.len(), 2);
        assert_eq!(document.attendees[1].name, "Linus");
        assert_eq!(document.attendees[1].surname, "");
    }

    #[test]
    fn explicit_null_draft_replaces_default() {
        let defaults = Document {
            draft: Some(sample_meeting(DRAFT_ID, 0)),
            ..Document::default()
        };

        assert_eq!(reconcile(&json!({ "draft": null }), &defaults).draft, None);
        assert_eq!(
            reconcile(&json!({ "settings": {} }), &defaults).draft,
            defaults.draft
        );
        assert_eq!(reconcile(&json!({ "draft": "broken" }), &defaults).draft, None);
    }

    #[test]
    fn full_document_round_trips() {
        let document = Document {
            settings: Settings {
                date_mode: DateMode::CalendarWeek,
                logo_data_url: Some("data:image/png;base64,iVBOR".to_string()),
                ..Settings::default()
            },
            attendees: sample_meeting("x", 0).attendees,
            meetings: vec![sample_meeting("m-1", 5), sample_meeting("m-2", 1)],
            draft: Some(sample_meeting(DRAFT_ID, 0)),
        };

        let raw = serde_json::to_string_pretty(&document).unwrap();
        assert_eq!(parse_document(&raw), document);
    }
}
