//! C interface to the minutes document store.
//!
//! Binding and finalizing have typed entry points returning [`MmStatus`];
//! everything else goes through the JSON command bridge in
//! [`mm_invoke_json`].

use std::{
    ffi::{c_char, c_void, CStr, CString},
    ptr,
    sync::{Arc, Mutex},
};

use minutes_core::{InvokeError, InvokeResponse, Runtime, StoreError};
use serde_json::Value;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

type MmEventCallback = unsafe extern "C" fn(event_json: *const c_char, user_data: *mut c_void);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmStatus {
    Ok = 0,
    NullArgument = 1,
    InvalidUtf8 = 2,
    NotConnected = 3,
    AccessDenied = 4,
    IoError = 5,
    InvalidFileName = 6,
    NoDraft = 7,
    NotFound = 8,
    SerializationFailure = 9,
}

impl From<&StoreError> for MmStatus {
    fn from(error: &StoreError) -> Self {
        match error {
            StoreError::NotConnected => Self::NotConnected,
            StoreError::AccessDenied(_) => Self::AccessDenied,
            StoreError::Io { .. } => Self::IoError,
            StoreError::InvalidFileName(_) => Self::InvalidFileName,
            StoreError::NoDraft => Self::NoDraft,
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Serialize(_) => Self::SerializationFailure,
        }
    }
}

#[derive(Clone, Copy)]
struct Subscriber {
    callback: MmEventCallback,
    user_data: usize,
}

/// Forwards store events (`document://connected`, `document://saved`, ...)
/// to whichever C callback is currently registered.
#[derive(Default)]
struct EventSink {
    subscriber: Mutex<Option<Subscriber>>,
}

impl EventSink {
    fn replace(&self, subscriber: Option<Subscriber>) {
        *self.subscriber.lock().expect("event sink mutex poisoned") = subscriber;
    }

    fn deliver(&self, event: &Value) {
        let Some(subscriber) = *self.subscriber.lock().expect("event sink mutex poisoned") else {
            return;
        };
        match CString::new(event.to_string()) {
            Ok(text) => unsafe {
                (subscriber.callback)(text.as_ptr(), subscriber.user_data as *mut c_void)
            },
            Err(err) => warn!(error = %err, "dropping event with interior NUL"),
        }
    }
}

pub struct MmMinutes {
    runtime: Runtime,
    events: Arc<EventSink>,
}

/// Installs a stderr log subscriber filtered by `RUST_LOG` (default `info`).
/// Returns false when a subscriber was already installed.
#[no_mangle]
pub extern "C" fn mm_init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Creates an unbound store. `config_json` may be null for defaults.
/// Returns null when the config is not valid UTF-8 JSON.
#[no_mangle]
pub unsafe extern "C" fn mm_minutes_open(config_json: *const c_char) -> *mut MmMinutes {
    let config = match optional_str(config_json) {
        Ok(config) => config.unwrap_or_default(),
        Err(_) => {
            error!("mm_minutes_open: config json is not UTF-8");
            return ptr::null_mut();
        }
    };

    let runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "mm_minutes_open: invalid runtime config");
            return ptr::null_mut();
        }
    };

    let events = Arc::new(EventSink::default());
    let sink = Arc::clone(&events);
    runtime.set_event_callback(move |_event, payload| sink.deliver(payload));

    Box::into_raw(Box::new(MmMinutes { runtime, events }))
}

#[no_mangle]
pub unsafe extern "C" fn mm_minutes_close(handle: *mut MmMinutes) {
    if handle.is_null() {
        return;
    }
    let minutes = Box::from_raw(handle);
    minutes.runtime.clear_event_callback();
    minutes.events.replace(None);
}

/// Registers `callback` for store events, or clears it when null.
#[no_mangle]
pub unsafe extern "C" fn mm_set_event_callback(
    handle: *mut MmMinutes,
    callback: Option<MmEventCallback>,
    user_data: *mut c_void,
) -> MmStatus {
    let Some(minutes) = handle.as_ref() else {
        return MmStatus::NullArgument;
    };
    minutes.events.replace(callback.map(|callback| Subscriber {
        callback,
        user_data: user_data as usize,
    }));
    MmStatus::Ok
}

/// Binds to `file_name` inside `folder`. Either may be null to use the
/// configured `dataDir` / `fileName`. A failed bind leaves the store unbound.
#[no_mangle]
pub unsafe extern "C" fn mm_connect(
    handle: *mut MmMinutes,
    folder: *const c_char,
    file_name: *const c_char,
) -> MmStatus {
    let Some(minutes) = handle.as_ref() else {
        return MmStatus::NullArgument;
    };
    let (folder, file_name) = match (optional_str(folder), optional_str(file_name)) {
        (Ok(folder), Ok(file_name)) => (folder, file_name),
        _ => return MmStatus::InvalidUtf8,
    };

    match minutes.runtime.connect(folder, file_name) {
        Ok(_) => MmStatus::Ok,
        Err(err) => {
            warn!(error = %err, "mm_connect failed");
            MmStatus::from(&err)
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn mm_disconnect(handle: *mut MmMinutes) -> MmStatus {
    let Some(minutes) = handle.as_ref() else {
        return MmStatus::NullArgument;
    };
    minutes.runtime.disconnect();
    MmStatus::Ok
}

#[no_mangle]
pub unsafe extern "C" fn mm_is_connected(handle: *const MmMinutes) -> bool {
    handle
        .as_ref()
        .map(|minutes| minutes.runtime.status().connected)
        .unwrap_or(false)
}

/// Finalizes the current draft. On success the new meeting id is written to
/// `meeting_id_out` (release it with [`mm_free_c_string`]) when non-null.
#[no_mangle]
pub unsafe extern "C" fn mm_finalize_draft(
    handle: *mut MmMinutes,
    meeting_id_out: *mut *mut c_char,
) -> MmStatus {
    let Some(minutes) = handle.as_ref() else {
        return MmStatus::NullArgument;
    };
    match minutes.runtime.finalize_draft() {
        Ok(meeting) => {
            if !meeting_id_out.is_null() {
                *meeting_id_out = into_c_string(meeting.id);
            }
            MmStatus::Ok
        }
        Err(err) => MmStatus::from(&err),
    }
}

/// Runs one bridge command. The returned string must be released with
/// [`mm_free_c_string`].
#[no_mangle]
pub unsafe extern "C" fn mm_invoke_json(
    handle: *mut MmMinutes,
    request_json: *const c_char,
) -> *mut c_char {
    let Some(minutes) = handle.as_ref() else {
        return failure("invalid_handle", "minutes handle is null");
    };
    match optional_str(request_json) {
        Ok(Some(request)) => into_c_string(minutes.runtime.invoke_json(request)),
        Ok(None) => failure("invalid_request", "request_json is null"),
        Err(_) => failure("invalid_request", "request_json must be UTF-8"),
    }
}

#[no_mangle]
pub unsafe extern "C" fn mm_free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, MmStatus> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| MmStatus::InvalidUtf8)
}

fn failure(code: &str, message: &str) -> *mut c_char {
    let response = InvokeResponse {
        ok: false,
        data: None,
        error: Some(InvokeError {
            code: code.to_string(),
            message: message.to_string(),
        }),
    };
    // Serializing plain strings cannot fail.
    into_c_string(serde_json::to_string(&response).unwrap_or_default())
}

fn into_c_string(value: String) -> *mut c_char {
    CString::new(value)
        .unwrap_or_else(|err| {
            let mut bytes = err.into_vec();
            bytes.retain(|byte| *byte != 0);
            CString::new(bytes).unwrap_or_default()
        })
        .into_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    unsafe fn call(handle: *mut MmMinutes, request: &str) -> Value {
        let request = CString::new(request).unwrap();
        let raw = mm_invoke_json(handle, request.as_ptr());
        let text = CStr::from_ptr(raw).to_str().unwrap().to_string();
        mm_free_c_string(raw);
        serde_json::from_str(&text).unwrap()
    }

    unsafe extern "C" fn count_events(_event_json: *const c_char, user_data: *mut c_void) {
        let counter = &*(user_data as *const Mutex<u32>);
        *counter.lock().unwrap() += 1;
    }

    #[test]
    fn null_arguments_are_reported() {
        unsafe {
            let response = call(ptr::null_mut(), r#"{"command":"get_status"}"#);
            assert_eq!(response["error"]["code"], "invalid_handle");
            assert_eq!(mm_connect(ptr::null_mut(), ptr::null(), ptr::null()), MmStatus::NullArgument);
            assert!(!mm_is_connected(ptr::null()));

            let handle = mm_minutes_open(ptr::null());
            assert!(!handle.is_null());
            let raw = mm_invoke_json(handle, ptr::null());
            let response: Value =
                serde_json::from_str(CStr::from_ptr(raw).to_str().unwrap()).unwrap();
            mm_free_c_string(raw);
            assert_eq!(response["error"]["code"], "invalid_request");
            mm_minutes_close(handle);
        }
    }

    #[test]
    fn invalid_config_yields_null_handle() {
        let config = CString::new("{not json").unwrap();
        let handle = unsafe { mm_minutes_open(config.as_ptr()) };
        assert!(handle.is_null());
    }

    #[test]
    fn bind_failures_map_to_status_codes() {
        let temp = TempDir::new().unwrap();
        let folder = CString::new(temp.path().to_str().unwrap()).unwrap();
        let escaping = CString::new("../minutes.json").unwrap();
        let missing = CString::new(temp.path().join("missing").to_str().unwrap()).unwrap();

        unsafe {
            let handle = mm_minutes_open(ptr::null());

            assert_eq!(mm_connect(handle, ptr::null(), ptr::null()), MmStatus::AccessDenied);
            assert_eq!(
                mm_connect(handle, folder.as_ptr(), escaping.as_ptr()),
                MmStatus::InvalidFileName
            );
            assert_eq!(mm_connect(handle, missing.as_ptr(), ptr::null()), MmStatus::IoError);
            assert!(!mm_is_connected(handle));
            assert_eq!(mm_finalize_draft(handle, ptr::null_mut()), MmStatus::NotConnected);

            assert_eq!(mm_connect(handle, folder.as_ptr(), ptr::null()), MmStatus::Ok);
            assert!(mm_is_connected(handle));
            assert_eq!(mm_finalize_draft(handle, ptr::null_mut()), MmStatus::NoDraft);

            assert_eq!(mm_disconnect(handle), MmStatus::Ok);
            assert!(!mm_is_connected(handle));
            mm_minutes_close(handle);
        }
    }

    #[test]
    fn finalize_returns_the_new_meeting_id() {
        let temp = TempDir::new().unwrap();
        let config = CString::new(
            serde_json::json!({ "dataDir": temp.path().to_str().unwrap(), "fileName": "board.json" })
                .to_string(),
        )
        .unwrap();
        let counter = Mutex::new(0u32);

        unsafe {
            let handle = mm_minutes_open(config.as_ptr());
            mm_set_event_callback(
                handle,
                Some(count_events),
                &counter as *const Mutex<u32> as *mut c_void,
            );

            assert_eq!(mm_connect(handle, ptr::null(), ptr::null()), MmStatus::Ok);
            let saved = call(
                handle,
                r#"{"command":"save_draft","payload":{"date":"2026-10-12","agendaPoints":[],"attendees":[]}}"#,
            );
            assert_eq!(saved["ok"], true);

            let mut meeting_id: *mut c_char = ptr::null_mut();
            assert_eq!(mm_finalize_draft(handle, &mut meeting_id), MmStatus::Ok);
            let id = CStr::from_ptr(meeting_id).to_str().unwrap().to_string();
            mm_free_c_string(meeting_id);

            let listed = call(handle, r#"{"command":"list_meetings"}"#);
            assert_eq!(listed["data"][0]["id"], id.as_str());

            mm_set_event_callback(handle, None, ptr::null_mut());
            mm_minutes_close(handle);
        }

        // connected, draft saved, draft finalized
        assert_eq!(*counter.lock().unwrap(), 3);
        assert!(temp.path().join("board.json").exists());
    }

    #[test]
    fn logging_installs_once() {
        let first = mm_init_logging();
        assert!(!mm_init_logging() || !first);
    }
}
