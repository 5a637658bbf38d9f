use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

pub mod models;
pub mod storage;

pub use models::{
    AgendaPoint, AgendaStatus, Attendee, DateMode, Document, Meeting, Settings, DRAFT_ID,
    SETTINGS_ID,
};
pub use storage::{
    DocumentStore, FixedFolderPicker, FolderAccess, FolderPicker, LocalFolder, MemoryFolder,
    StoreError, DEFAULT_FILE_NAME,
};

use models::{AttendeeIndexInput, ConnectInput, MeetingIdInput, StoreStatus};

type SharedCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl RuntimeConfig {
    fn default_file_name(&self) -> &str {
        self.file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeError {
    pub code: String,
    pub message: String,
}

impl From<StoreError> for InvokeError {
    fn from(error: StoreError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvokeError>,
}

/// JSON command surface over one [`DocumentStore`] for host shells.
pub struct Runtime {
    config: RuntimeConfig,
    picker: Box<dyn FolderPicker + Sync>,
    store: Mutex<DocumentStore>,
    callback: Mutex<Option<SharedCallback>>,
}

impl Runtime {
    pub fn new(config_json: &str) -> anyhow::Result<Self> {
        let config = if config_json.trim().is_empty() {
            RuntimeConfig::default()
        } else {
            serde_json::from_str(config_json)?
        };

        let picker = FixedFolderPicker::new(config.data_dir.as_ref().map(PathBuf::from));
        Ok(Self::with_picker(config, picker))
    }

    pub fn with_picker(config: RuntimeConfig, picker: impl FolderPicker + Sync + 'static) -> Self {
        Self {
            config,
            picker: Box::new(picker),
            store: Mutex::new(DocumentStore::new()),
            callback: Mutex::new(None),
        }
    }

    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let mut guard = self.callback.lock().expect("callback mutex poisoned");
        *guard = Some(Arc::new(callback));
    }

    pub fn clear_event_callback(&self) {
        let mut guard = self.callback.lock().expect("callback mutex poisoned");
        *guard = None;
    }

    pub fn invoke_json(&self, request_json: &str) -> String {
        let parsed = serde_json::from_str::<InvokeRequest>(request_json);
        let response = match parsed {
            Ok(request) => self.dispatch(request),
            Err(error) => Err(InvokeError {
                code: "invalid_request".to_string(),
                message: format!("invalid request JSON: {error}"),
            }),
        };

        let payload = match response {
            Ok(data) => InvokeResponse {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(error) => InvokeResponse {
                ok: false,
                data: None,
                error: Some(error),
            },
        };

        serde_json::to_string(&payload).unwrap_or_else(|_| {
            r#"{"ok":false,"error":{"code":"serialization_failure","message":"failed to serialize response"}}"#
                .to_string()
        })
    }

    fn dispatch(&self, request: InvokeRequest) -> Result<Value, InvokeError> {
        let payload = request.payload;
        match request.command.as_str() {
            "get_status" => to_value(self.status()),
            "connect" => {
                let input = if payload.is_null() {
                    ConnectInput::default()
                } else {
                    parse_payload::<ConnectInput>(payload)?
                };
                let status = self.connect(input.folder.as_deref(), input.file_name.as_deref())?;
                to_value(status)
            }
            "disconnect" => {
                self.disconnect();
                Ok(json!({ "connected": false }))
            }
            "get_document" => to_value(self.store().document()),
            "get_settings" => to_value(self.store().get_settings()),
            "save_settings" => {
                let settings = parse_payload::<Settings>(payload)?;
                let saved = self.mutate(|store| store.save_settings(settings))?;
                to_value(saved)
            }
            "get_attendees" => to_value(self.store().get_attendees()),
            "save_attendees" => {
                let attendees = parse_payload::<Vec<Attendee>>(payload)?;
                self.mutate(|store| store.save_attendees(attendees))?;
                to_value(self.store().get_attendees())
            }
            "add_attendee" => {
                let attendee = parse_payload::<Attendee>(payload)?;
                self.mutate(|store| store.add_attendee(attendee))?;
                to_value(self.store().get_attendees())
            }
            "remove_attendee" => {
                let input = parse_payload::<AttendeeIndexInput>(payload)?;
                let removed = self.mutate(|store| store.remove_attendee(input.index))?;
                to_value(removed)
            }
            "get_draft" => to_value(self.store().get_draft()),
            "save_draft" => {
                let draft = parse_payload::<Meeting>(payload)?;
                let saved = self.mutate(|store| store.save_draft(draft))?;
                to_value(saved)
            }
            "clear_draft" => {
                self.mutate(DocumentStore::clear_draft)?;
                Ok(Value::Null)
            }
            "finalize_draft" => to_value(self.finalize_draft()?),
            "list_meetings" => to_value(self.store().get_all_meetings()),
            "get_meeting" => {
                let input = parse_payload::<MeetingIdInput>(payload)?;
                let store = self.store();
                let meeting = store
                    .get_meeting(&input.id)
                    .ok_or_else(|| StoreError::NotFound(format!("meeting {}", input.id)))?;
                to_value(meeting)
            }
            "save_meeting" => {
                let meeting = parse_payload::<Meeting>(payload)?;
                let saved = self.mutate(|store| store.save_meeting(meeting))?;
                to_value(saved)
            }
            "delete_meeting" => {
                let input = parse_payload::<MeetingIdInput>(payload)?;
                let deleted = self.mutate(|store| store.delete_meeting(&input.id))?;
                Ok(json!({ "deleted": deleted }))
            }
            _ => Err(InvokeError {
                code: "unknown_command".to_string(),
                message: format!("unsupported command: {}", request.command),
            }),
        }
    }

    pub fn status(&self) -> StoreStatus {
        let store = self.store();
        StoreStatus {
            connected: store.is_connected(),
            file_name: store.file_name().map(str::to_string),
            location: store.location(),
            platform: self
                .config
                .platform
                .clone()
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            meeting_count: store.document().meetings.len(),
            has_draft: store.get_draft().is_some(),
        }
    }

    /// Requests a folder grant and binds the store to `file_name` inside it.
    /// Blank arguments fall back to the configured folder and file name.
    pub fn connect(
        &self,
        folder: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<StoreStatus, StoreError> {
        let file_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.default_file_name())
            .to_string();

        {
            let mut store = self.store();
            // A refused grant must still drop the previous binding.
            let folder = match self.picker.request_folder(folder) {
                Ok(folder) => folder,
                Err(error) => {
                    store.disconnect();
                    warn!(%error, "folder access was not granted");
                    return Err(error);
                }
            };
            store.connect(folder, &file_name)?;
        }

        self.emit_event("document://connected", &json!({ "fileName": file_name }));
        Ok(self.status())
    }

    pub fn disconnect(&self) {
        self.store().disconnect();
        self.emit_event("document://disconnected", &json!({}));
    }

    pub fn finalize_draft(&self) -> Result<Meeting, StoreError> {
        self.mutate(DocumentStore::finalize_draft)
    }

    fn mutate<T>(
        &self,
        operation: impl FnOnce(&mut DocumentStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let (result, file_name) = {
            let mut store = self.store();
            let result = operation(&mut *store)?;
            (result, store.file_name().map(str::to_string))
        };
        self.emit_event("document://saved", &json!({ "fileName": file_name }));
        Ok(result)
    }

    fn store(&self) -> MutexGuard<'_, DocumentStore> {
        self.store.lock().expect("document store mutex poisoned")
    }

    fn emit_event(&self, event: &str, payload: &Value) {
        let callback = {
            let guard = self.callback.lock().expect("callback mutex poisoned");
            guard.clone()
        };
        if let Some(callback) = callback {
            let event_payload = json!({
                "event": event,
                "payload": payload
            });
            callback(event, &event_payload);
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T, InvokeError> {
    serde_json::from_value(payload).map_err(invalid_payload)
}

fn to_value(value: impl Serialize) -> Result<Value, InvokeError> {
    serde_json::to_value(value).map_err(|error| StoreError::Serialize(error).into())
}

fn invalid_payload(error: serde_json::Error) -> InvokeError {
    InvokeError {
        code: "invalid_payload".to_string(),
        message: error.to_string(),
    }
}
