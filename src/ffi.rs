//! FFI bindings for bandscore
//!
//! This module provides C-compatible functions for embedding the engine in a
//! host application. Strings are null-terminated; returned strings are
//! allocated by the library and must be freed with `bandscore_free_string`.
//! Bands are passed as their index in `Band::ALL` (0 = delta .. 4 = gamma).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::config::EngineConfig;
use crate::engine::BandEngine;
use crate::types::Band;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn band_from_index(index: i32) -> Option<Band> {
    let result = usize::try_from(index)
        .map_err(|_| crate::ComputeError::UnknownBand(format!("index {}", index)))
        .and_then(Band::from_index);
    match result {
        Ok(band) => Some(band),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Opaque handle to a BandEngine
pub struct BandEngineHandle {
    engine: BandEngine,
}

/// Create a new engine.
///
/// # Safety
/// - `config_json` must be NULL (defaults) or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `bandscore_engine_free`.
/// - Returns NULL on error; call `bandscore_last_error` to get the message.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_new(config_json: *const c_char) -> *mut BandEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match BandEngine::with_config(config) {
        Ok(engine) => Box::into_raw(Box::new(BandEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_free(engine: *mut BandEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Record the mean of `len` values for a band.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - `values` must point to `len` readable doubles.
/// - Returns the new score, or NaN on error (see `bandscore_last_error`).
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_on_sample(
    engine: *mut BandEngineHandle,
    band: i32,
    values: *const f64,
    len: usize,
) -> f64 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return f64::NAN;
    }
    let handle = &mut *engine;

    let Some(band) = band_from_index(band) else {
        return f64::NAN;
    };

    let values: &[f64] = if values.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(values, len)
    };

    match handle.engine.on_sample(band, values) {
        Ok(score) => score,
        Err(e) => {
            set_last_error(&e.to_string());
            f64::NAN
        }
    }
}

/// Store the headband contact flag (1 = attached).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_set_headband_status(
    engine: *mut BandEngineHandle,
    status: i32,
) {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return;
    }
    (*engine).engine.set_headband_status(status as i64);
}

/// Store an accelerometer reading.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_set_accelerometer(
    engine: *mut BandEngineHandle,
    x: f64,
    y: f64,
    z: f64,
) {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return;
    }
    (*engine).engine.set_accelerometer(x, y, z);
}

/// Close the current update cycle.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns 1 if relative powers were recomputed, 0 if gated, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_advance_cycle(engine: *mut BandEngineHandle) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    i32::from((*engine).engine.advance_cycle())
}

// ============================================================================
// Outbound
// ============================================================================

unsafe fn read_band(
    engine: *const BandEngineHandle,
    band: i32,
    read: impl Fn(&BandEngine, Band) -> f64,
) -> f64 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return f64::NAN;
    }
    match band_from_index(band) {
        Some(band) => read(&(*engine).engine, band),
        None => f64::NAN,
    }
}

/// Latest score for a band.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns NaN on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_score(engine: *const BandEngineHandle, band: i32) -> f64 {
    read_band(engine, band, BandEngine::score)
}

/// Latest relative power for a band.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns NaN on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_relative_power(
    engine: *const BandEngineHandle,
    band: i32,
) -> f64 {
    read_band(engine, band, BandEngine::relative_power)
}

/// Latest absolute power for a band.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns NaN on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_absolute_power(
    engine: *const BandEngineHandle,
    band: i32,
) -> f64 {
    read_band(engine, band, BandEngine::absolute_power)
}

/// Headband contact flag.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns 1 if attached, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_headband_attached(
    engine: *const BandEngineHandle,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    i32::from((*engine).engine.headband_attached())
}

/// Snapshot of all bands as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns a newly allocated string that must be freed with `bandscore_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_snapshot_json(
    engine: *const BandEngineHandle,
    include_recent: bool,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    match (*engine).engine.snapshot_json(include_recent) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Save engine state to JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - Returns a newly allocated string that must be freed with `bandscore_free_string`.
/// - Returns NULL on error; call `bandscore_last_error` to get the message.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_save_state(
    engine: *const BandEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    match (*engine).engine.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load engine state from JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bandscore_engine_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn bandscore_engine_load_state(
    engine: *mut BandEngineHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match (*engine).engine.load_state(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by bandscore functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a bandscore function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn bandscore_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next bandscore call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn bandscore_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn bandscore_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn last_error() -> String {
        let error = bandscore_last_error();
        assert!(!error.is_null());
        CStr::from_ptr(error).to_str().unwrap().to_string()
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = bandscore_engine_new(ptr::null());
            assert!(!engine.is_null());

            bandscore_engine_set_headband_status(engine, 1);
            assert_eq!(bandscore_engine_headband_attached(engine), 1);

            let values = [0.1, 0.2, 0.3, 0.4];
            for band in 0..5 {
                let score = bandscore_engine_on_sample(engine, band, values.as_ptr(), values.len());
                assert_eq!(score, 0.5);
            }

            assert_eq!(bandscore_engine_advance_cycle(engine), 1);
            for band in 0..5 {
                let relative = bandscore_engine_relative_power(engine, band);
                assert!((relative - 0.2).abs() < 1e-12);
                assert!((bandscore_engine_absolute_power(engine, band) - 0.25).abs() < 1e-12);
            }

            let snapshot = bandscore_engine_snapshot_json(engine, false);
            assert!(!snapshot.is_null());
            let snapshot_str = CStr::from_ptr(snapshot).to_str().unwrap();
            assert!(snapshot_str.contains("\"producer\""));
            bandscore_free_string(snapshot);

            bandscore_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_state_round_trip() {
        unsafe {
            let engine = bandscore_engine_new(ptr::null());
            for v in 1..=10 {
                let value = [v as f64];
                bandscore_engine_on_sample(engine, 2, value.as_ptr(), 1);
            }

            let state = bandscore_engine_save_state(engine);
            assert!(!state.is_null());

            let engine2 = bandscore_engine_new(ptr::null());
            assert_eq!(bandscore_engine_load_state(engine2, state), 0);
            assert_eq!(bandscore_engine_score(engine2, 2), 1.0);

            bandscore_free_string(state);
            bandscore_engine_free(engine);
            bandscore_engine_free(engine2);
        }
    }

    #[test]
    fn test_ffi_config() {
        unsafe {
            let config = CString::new(r#"{"statistic": {"degenerate_score": 0.0}}"#).unwrap();
            let engine = bandscore_engine_new(config.as_ptr());
            assert!(!engine.is_null());

            let value = [3.0];
            assert_eq!(bandscore_engine_on_sample(engine, 0, value.as_ptr(), 1), 0.0);
            bandscore_engine_free(engine);

            let bad = CString::new(r#"{"statistic": {"cutoff": 0.6}}"#).unwrap();
            let engine = bandscore_engine_new(bad.as_ptr());
            assert!(engine.is_null());
            assert!(last_error().contains("cutoff"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let engine = bandscore_engine_new(ptr::null());

            assert!(bandscore_engine_score(engine, 9).is_nan());
            assert!(last_error().contains("Unknown band"));

            assert!(bandscore_engine_score(engine, -1).is_nan());

            let score = bandscore_engine_on_sample(engine, 1, ptr::null(), 0);
            assert!(score.is_nan());
            assert!(last_error().contains("Invalid payload"));

            let values = [0.4, f64::NAN, 0.4, 0.4];
            let score = bandscore_engine_on_sample(engine, 1, values.as_ptr(), values.len());
            assert!(score.is_nan());
            assert!(last_error().contains("non-finite"));

            let values = [1e308, 1e308];
            let score = bandscore_engine_on_sample(engine, 1, values.as_ptr(), values.len());
            assert!(score.is_nan());
            assert!(last_error().contains("overflows"));
            assert_eq!(bandscore_engine_absolute_power(engine, 1), 0.0);

            assert!(bandscore_engine_score(ptr::null(), 0).is_nan());
            assert_eq!(last_error(), "Null engine pointer");

            bandscore_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = bandscore_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
