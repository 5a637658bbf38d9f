use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Attendee, Document, Meeting, Settings, DRAFT_ID, SETTINGS_ID};

use super::{
    folder::validate_file_name, schema::parse_document, FolderAccess, StoreError, StoreResult,
};

struct Binding {
    folder: Box<dyn FolderAccess>,
    file_name: String,
}

/// One minutes document bound to at most one file.
///
/// Reads are served from memory. Every mutation rewrites the whole file.
pub struct DocumentStore {
    binding: Option<Binding>,
    document: Document,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            binding: None,
            document: Document::default(),
        }
    }

    /// Binds to `file_name` inside `folder`, creating it when absent.
    ///
    /// The previous binding and document are discarded first, so a failed
    /// bind leaves the store disconnected with a default document.
    pub fn connect(&mut self, folder: Box<dyn FolderAccess>, file_name: &str) -> StoreResult<()> {
        self.disconnect();
        validate_file_name(file_name)?;

        let exists = folder
            .list_entries()?
            .iter()
            .any(|entry| entry == file_name);
        if !exists {
            folder.write_file(file_name, "")?;
        }

        let raw = folder.read_file(file_name)?;
        self.document = parse_document(&raw);

        info!(
            location = %folder.location(),
            file = file_name,
            meetings = self.document.meetings.len(),
            "connected minutes file"
        );
        self.binding = Some(Binding {
            folder,
            file_name: file_name.to_string(),
        });
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(file = %binding.file_name, "disconnected minutes file");
        }
        self.document = Document::default();
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.binding.as_ref().map(|binding| binding.file_name.as_str())
    }

    pub fn location(&self) -> Option<String> {
        self.binding.as_ref().map(|binding| binding.folder.location())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Writes the whole document over the bound file.
    pub fn save(&self) -> StoreResult<()> {
        self.write(&self.document)
    }

    pub fn get_settings(&self) -> &Settings {
        &self.document.settings
    }

    pub fn save_settings(&mut self, mut settings: Settings) -> StoreResult<Settings> {
        settings.id = SETTINGS_ID.to_string();
        let saved = settings.clone();
        self.commit(|document| {
            document.settings = settings;
            Ok(())
        })?;
        Ok(saved)
    }

    pub fn get_attendees(&self) -> &[Attendee] {
        &self.document.attendees
    }

    pub fn save_attendees(&mut self, attendees: Vec<Attendee>) -> StoreResult<()> {
        self.commit(|document| {
            document.attendees = attendees;
            Ok(())
        })
    }

    pub fn add_attendee(&mut self, attendee: Attendee) -> StoreResult<()> {
        self.commit(|document| {
            document.attendees.push(attendee);
            Ok(())
        })
    }

    pub fn remove_attendee(&mut self, index: usize) -> StoreResult<Attendee> {
        self.commit(|document| {
            if index >= document.attendees.len() {
                return Err(StoreError::NotFound(format!("attendee #{index}")));
            }
            Ok(document.attendees.remove(index))
        })
    }

    pub fn get_draft(&self) -> Option<&Meeting> {
        self.document.draft.as_ref()
    }

    pub fn save_draft(&mut self, mut draft: Meeting) -> StoreResult<Meeting> {
        draft.id = DRAFT_ID.to_string();
        let saved = draft.clone();
        self.commit(|document| {
            document.draft = Some(draft);
            Ok(())
        })?;
        Ok(saved)
    }

    pub fn clear_draft(&mut self) -> StoreResult<()> {
        self.commit(|document| {
            document.draft = None;
            Ok(())
        })
    }

    /// Moves the draft into the meeting history under a fresh id.
    pub fn finalize_draft(&mut self) -> StoreResult<Meeting> {
        let meeting = self.commit(|document| {
            let mut meeting = document.draft.take().ok_or(StoreError::NoDraft)?;
            meeting.id = Uuid::new_v4().to_string();
            meeting.finalized_at = Utc::now().timestamp_millis();
            upsert(&mut document.meetings, meeting.clone());
            Ok(meeting)
        })?;
        info!(meeting = %meeting.id, "finalized draft");
        Ok(meeting)
    }

    /// Meetings newest first; unfinalized entries last.
    pub fn get_all_meetings(&self) -> Vec<Meeting> {
        let mut meetings = self.document.meetings.clone();
        meetings.sort_by(|a, b| b.finalized_at.max(0).cmp(&a.finalized_at.max(0)));
        meetings
    }

    pub fn get_meeting(&self, id: &str) -> Option<&Meeting> {
        self.document.meetings.iter().find(|meeting| meeting.id == id)
    }

    pub fn save_meeting(&mut self, meeting: Meeting) -> StoreResult<Meeting> {
        let saved = meeting.clone();
        self.commit(|document| {
            upsert(&mut document.meetings, meeting);
            Ok(())
        })?;
        Ok(saved)
    }

    /// Returns whether a meeting with `id` existed.
    pub fn delete_meeting(&mut self, id: &str) -> StoreResult<bool> {
        self.commit(|document| {
            let before = document.meetings.len();
            document.meetings.retain(|meeting| meeting.id != id);
            Ok(document.meetings.len() != before)
        })
    }

    /// Applies `change` to a copy of the document and keeps it only once the
    /// copy is on disk. A failed write leaves memory matching the file.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut Document) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.binding()?;
        let mut next = self.document.clone();
        let result = change(&mut next)?;
        self.write(&next)?;
        self.document = next;
        Ok(result)
    }

    fn write(&self, document: &Document) -> StoreResult<()> {
        let binding = self.binding()?;
        let serialized = serde_json::to_string_pretty(document)?;
        binding.folder.write_file(&binding.file_name, &serialized)?;
        debug!(file = %binding.file_name, bytes = serialized.len(), "saved minutes file");
        Ok(())
    }

    fn binding(&self) -> StoreResult<&Binding> {
        self.binding.as_ref().ok_or(StoreError::NotConnected)
    }
}

fn upsert(meetings: &mut Vec<Meeting>, meeting: Meeting) {
    if let Some(existing) = meetings.iter_mut().find(|existing| existing.id == meeting.id) {
        *existing = meeting;
    } else {
        meetings.push(meeting);
    }
}
