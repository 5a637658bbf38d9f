use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Fixed id of the settings singleton.
pub const SETTINGS_ID: &str = "app";

/// Fixed id of the in-progress meeting.
pub const DRAFT_ID: &str = "draft";

pub const DEFAULT_PDF_ACCENT_COLOR: &str = "#1f4e79";
pub const DEFAULT_PDF_BG_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DateMode {
    #[default]
    Exact,
    CalendarWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: String,
    pub date_mode: DateMode,
    pub logo_data_url: Option<String>,
    pub pdf_accent_color: String,
    pub pdf_bg_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            date_mode: DateMode::Exact,
            logo_data_url: None,
            pdf_accent_color: DEFAULT_PDF_ACCENT_COLOR.to_string(),
            pdf_bg_color: DEFAULT_PDF_BG_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Attendee {
    #[serde(deserialize_with = "or_default")]
    pub name: String,
    #[serde(deserialize_with = "or_default")]
    pub surname: String,
    #[serde(deserialize_with = "or_default")]
    pub company: String,
}

impl Attendee {
    /// Label used when an agenda point is assigned to this attendee.
    pub fn display_name(&self) -> String {
        match (self.name.trim(), self.surname.trim()) {
            ("", surname) => surname.to_string(),
            (name, "") => name.to_string(),
            (name, surname) => format!("{name} {surname}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgendaStatus {
    #[default]
    Open,
    Resolved,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AgendaPoint {
    #[serde(deserialize_with = "or_default")]
    pub title: String,
    #[serde(deserialize_with = "or_default")]
    pub description: String,
    #[serde(deserialize_with = "or_default")]
    pub assignee: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub deadline: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub status: AgendaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Meeting {
    #[serde(deserialize_with = "or_default")]
    pub id: String,
    /// Epoch milliseconds; zero while the meeting has not been finalized.
    #[serde(deserialize_with = "epoch_millis")]
    pub finalized_at: i64,
    #[serde(deserialize_with = "or_default")]
    pub date: String,
    #[serde(deserialize_with = "entries")]
    pub agenda_points: Vec<AgendaPoint>,
    #[serde(deserialize_with = "entries")]
    pub attendees: Vec<Attendee>,
}

impl Meeting {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub settings: Settings,
    pub attendees: Vec<Attendee>,
    pub meetings: Vec<Meeting>,
    pub draft: Option<Meeting>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInput {
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingIdInput {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeIndexInput {
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub connected: bool,
    pub file_name: Option<String>,
    pub location: Option<String>,
    pub platform: String,
    pub meeting_count: usize,
    pub has_draft: bool,
}

// Files written by other clients carry nulls and odd number types inside
// entries. A bad field falls back to its default instead of failing the entry.

fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn epoch_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|millis| millis.is_finite())
                .map(|millis| millis as i64)
        })
        .unwrap_or_default())
}

fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(decode_entries(&Value::deserialize(deserializer)?, "meeting entries"))
}

/// Decodes a list of records. Non-lists become empty; entries that are not
/// objects are dropped.
pub(crate) fn decode_entries<T: DeserializeOwned>(value: &Value, section: &str) -> Vec<T> {
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            warn!(section, "section is not a list, using an empty list");
        }
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if !item.is_object() {
                warn!(section, index, "dropping entry that is not an object");
                return None;
            }
            match serde_json::from_value(item.clone()) {
                Ok(parsed) => Some(parsed),
                Err(error) => {
                    warn!(section, index, %error, "dropping malformed entry");
                    None
                }
            }
        })
        .collect()
}
