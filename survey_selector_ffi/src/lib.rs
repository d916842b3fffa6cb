#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::ptr;

use survey_selector_core::{Candidates, SelectionEvent, SelectionObserver};
use survey_selector_host::{HostConfig, HostError, QuarantineSnapshot, SelectorHost};

/// FFI ABI version for survey_selector_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const SVS_FFI_VERSION: u32 = 1;

pub const SVS_OK: i32 = 0;
/// `svs_host_choose` ran but no candidate was eligible.
pub const SVS_NONE_CHOSEN: i32 = 1;
pub const SVS_ERR_NULL: i32 = -1;
pub const SVS_ERR_UTF8: i32 = -2;
pub const SVS_ERR_JSON: i32 = -3;
pub const SVS_ERR_REGISTRY: i32 = -4;
pub const SVS_ERR_STORE: i32 = -5;
pub const SVS_ERR_IO: i32 = -6;

#[no_mangle]
pub extern "C" fn svs_ffi_version() -> u32 {
    SVS_FFI_VERSION
}

/// FFI string view (UTF-8 bytes, not NUL-terminated).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SvsStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl SvsStr {
    pub const fn null() -> Self {
        SvsStr {
            ptr: ptr::null(),
            len: 0,
        }
    }

    fn borrowed(s: &str) -> Self {
        SvsStr {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    /// `Ok(None)` for a null pointer, `Err` for invalid UTF-8.
    unsafe fn as_str(&self) -> Result<Option<&str>, i32> {
        if self.ptr.is_null() {
            return Ok(None);
        }
        let bytes = std::slice::from_raw_parts(self.ptr, self.len);
        std::str::from_utf8(bytes).map(Some).map_err(|_| SVS_ERR_UTF8)
    }
}

/// Owned byte buffer. Free with `svs_bytes_free`.
#[repr(C)]
pub struct SvsBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl SvsBytes {
    fn empty() -> Self {
        SvsBytes {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_vec(v: Vec<u8>) -> Self {
        let mut boxed = v.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        SvsBytes { ptr, len }
    }
}

/// Result of `svs_host_choose`. `id` is owned; free with `svs_bytes_free`.
#[repr(C)]
pub struct SvsChoice {
    pub rc: i32,
    pub priority: i64,
    pub id: SvsBytes,
}

#[repr(C)]
pub struct SvsRestoreStats {
    pub applied: u32,
    pub overwritten: u32,
    pub rc: i32,
}

/// Event callback: `(user_data, event_type, payload_json)`. Both strings are only valid
/// for the duration of the call.
pub type SvsEventCallback = extern "C" fn(user_data: *mut c_void, event_type: SvsStr, payload_json: SvsStr);

/// Diagnostic callback: `(user_data, message)`.
pub type SvsLogCallback = extern "C" fn(user_data: *mut c_void, message: SvsStr);

#[derive(Clone, Copy)]
struct CallbackObserver {
    on_event: Option<SvsEventCallback>,
    on_log: Option<SvsLogCallback>,
    user_data: *mut c_void,
}

impl SelectionObserver for CallbackObserver {
    fn on_event(&self, event: &SelectionEvent) {
        if let Some(cb) = self.on_event {
            let payload = event.payload().to_string();
            cb(self.user_data, SvsStr::borrowed(event.event_type()), SvsStr::borrowed(&payload));
        }
    }

    fn log(&self, message: &str) {
        if let Some(cb) = self.on_log {
            cb(self.user_data, SvsStr::borrowed(message));
        }
    }
}

/// Opaque handle exposed over FFI.
pub struct SvsHost {
    inner: SelectorHost,
    callbacks: CallbackObserver,
}

fn host_error_rc(err: &HostError) -> i32 {
    match err {
        HostError::Json(_) => SVS_ERR_JSON,
        HostError::Registry(_) => SVS_ERR_REGISTRY,
        HostError::Store(_) => SVS_ERR_STORE,
        HostError::Io { .. } => SVS_ERR_IO,
    }
}

/// Create a host from a JSON configuration document (see `HostConfig`). A null or
/// empty string uses defaults. Returns null on invalid configuration.
///
/// This library does not spawn threads and the handle is not thread-safe.
#[no_mangle]
pub unsafe extern "C" fn svs_host_new(config_json: SvsStr) -> *mut SvsHost {
    let cfg = match config_json.as_str() {
        Ok(None) => HostConfig::default(),
        Ok(Some(text)) => match HostConfig::from_json_str(text) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("svs_host_new: {err}");
                return ptr::null_mut();
            }
        },
        Err(_) => return ptr::null_mut(),
    };

    let handle = SvsHost {
        inner: SelectorHost::new(cfg),
        callbacks: CallbackObserver {
            on_event: None,
            on_log: None,
            user_data: ptr::null_mut(),
        },
    };
    Box::into_raw(Box::new(handle))
}

#[no_mangle]
pub unsafe extern "C" fn svs_host_free(h: *mut SvsHost) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Replace the survey registry from a JSON document.
/// Returns the number of surveys loaded (>= 0) or a negative error code.
#[no_mangle]
pub unsafe extern "C" fn svs_host_set_registry(h: *mut SvsHost, registry_json: SvsStr) -> i32 {
    if h.is_null() {
        return SVS_ERR_NULL;
    }
    let handle = &mut *h;
    let text = match registry_json.as_str() {
        Ok(Some(t)) => t,
        Ok(None) => return SVS_ERR_NULL,
        Err(rc) => return rc,
    };
    match handle.inner.load_registry_json(text) {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(err) => host_error_rc(&err),
    }
}

/// Install event and log callbacks. Either may be null. `user_data` is passed back
/// untouched and must outlive the handle (or the next call to this function).
#[no_mangle]
pub unsafe extern "C" fn svs_host_set_callbacks(
    h: *mut SvsHost,
    on_event: Option<SvsEventCallback>,
    on_log: Option<SvsLogCallback>,
    user_data: *mut c_void,
) -> i32 {
    if h.is_null() {
        return SVS_ERR_NULL;
    }
    let handle = &mut *h;
    handle.callbacks = CallbackObserver {
        on_event,
        on_log,
        user_data,
    };
    handle.inner.set_observer(handle.callbacks);
    SVS_OK
}

/// Choose a survey. `candidates` is either comma-separated ids or a JSON array.
#[no_mangle]
pub unsafe extern "C" fn svs_host_choose(h: *mut SvsHost, candidates: SvsStr) -> SvsChoice {
    let fail = |rc| SvsChoice {
        rc,
        priority: 0,
        id: SvsBytes::empty(),
    };
    if h.is_null() {
        return fail(SVS_ERR_NULL);
    }
    let handle = &*h;

    let input = match candidates.as_str() {
        Ok(None) => Candidates::Scalar(serde_json::Value::Null),
        Ok(Some(text)) if text.trim_start().starts_with('[') => {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(v) => Candidates::from(v),
                Err(_) => return fail(SVS_ERR_JSON),
            }
        }
        Ok(Some(text)) => Candidates::from(text),
        Err(rc) => return fail(rc),
    };

    match handle.inner.choose(input) {
        Some(survey) => SvsChoice {
            rc: SVS_OK,
            priority: survey.priority.unwrap_or_default(),
            id: SvsBytes::from_vec(survey.id.as_bytes().to_vec()),
        },
        None => fail(SVS_NONE_CHOSEN),
    }
}

#[no_mangle]
pub unsafe extern "C" fn svs_host_quarantine(h: *mut SvsHost, survey_id: SvsStr, days: u32) -> i32 {
    if h.is_null() {
        return SVS_ERR_NULL;
    }
    let handle = &*h;
    match survey_id.as_str() {
        Ok(Some(id)) => {
            handle.inner.quarantine(id, days);
            SVS_OK
        }
        Ok(None) => SVS_ERR_NULL,
        Err(rc) => rc,
    }
}

/// 1 when quarantined, 0 when clear, negative on error.
#[no_mangle]
pub unsafe extern "C" fn svs_host_is_quarantined(h: *mut SvsHost, survey_id: SvsStr) -> i32 {
    if h.is_null() {
        return SVS_ERR_NULL;
    }
    let handle = &*h;
    match survey_id.as_str() {
        Ok(Some(id)) => handle.inner.is_quarantined(id) as i32,
        Ok(None) => SVS_ERR_NULL,
        Err(rc) => rc,
    }
}

#[no_mangle]
pub unsafe extern "C" fn svs_host_end_session(h: *mut SvsHost) -> i32 {
    if h.is_null() {
        return SVS_ERR_NULL;
    }
    match (*h).inner.end_session() {
        Ok(()) => SVS_OK,
        Err(err) => host_error_rc(&err),
    }
}

/// Export quarantine state as a JSON document. Null buffer on error.
#[no_mangle]
pub unsafe extern "C" fn svs_host_snapshot(h: *mut SvsHost) -> SvsBytes {
    if h.is_null() {
        return SvsBytes::empty();
    }
    let handle = &*h;
    let snap = match handle.inner.snapshot() {
        Ok(s) => s,
        Err(err) => {
            log::warn!("svs_host_snapshot: {err}");
            return SvsBytes::empty();
        }
    };
    match serde_json::to_vec(&snap) {
        Ok(buf) => SvsBytes::from_vec(buf),
        Err(_) => SvsBytes::empty(),
    }
}

/// Import a snapshot produced by `svs_host_snapshot`. `merge != 0` keeps existing
/// entries that the snapshot does not mention.
#[no_mangle]
pub unsafe extern "C" fn svs_host_restore(
    h: *mut SvsHost,
    bytes: *const u8,
    len: usize,
    merge: u8,
) -> SvsRestoreStats {
    let fail = |rc| SvsRestoreStats {
        applied: 0,
        overwritten: 0,
        rc,
    };
    if h.is_null() || bytes.is_null() {
        return fail(SVS_ERR_NULL);
    }
    let handle = &*h;
    let data = std::slice::from_raw_parts(bytes, len);

    let snap: QuarantineSnapshot = match serde_json::from_slice(data) {
        Ok(s) => s,
        Err(_) => return fail(SVS_ERR_JSON),
    };

    let res = if merge != 0 {
        handle.inner.restore_merge(snap)
    } else {
        handle.inner.restore(snap)
    };

    match res {
        Ok(stats) => SvsRestoreStats {
            applied: stats.applied as u32,
            overwritten: stats.overwritten as u32,
            rc: SVS_OK,
        },
        Err(err) => fail(host_error_rc(&err)),
    }
}

#[no_mangle]
pub unsafe extern "C" fn svs_bytes_free(b: SvsBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}
