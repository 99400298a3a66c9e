//! Opaque-handle C ABI for embedding the merger in other-language drivers.
//!
//! Every fallible entry point returns an error handle: null means success,
//! anything else owns a message readable through
//! [`profmerge_error_string`] and released with [`profmerge_error_dispose`].
//! Internal errors and panics are captured into the handle; nothing aborts
//! the host process on correct input.

use crate::error::ProfileError;
use crate::merge::manager::{MergeManager, MergeSession};
use crate::schema::{self, Profile};
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

/// Owned error message handed across the boundary.
pub struct ProfmergeError {
    message: CString,
}

/// Owned byte string handed across the boundary.
pub struct ProfmergeString {
    bytes: Vec<u8>,
}

fn capture_error(message: String) -> *mut ProfmergeError {
    let message = CString::new(message)
        .unwrap_or_else(|_| CString::new("invalid error message").unwrap());
    Box::into_raw(Box::new(ProfmergeError { message }))
}

/// Runs a fallible closure, converting errors and panics into an error
/// handle.
fn intercept<F>(func: F) -> *mut ProfmergeError
where
    F: FnOnce() -> Result<(), ProfileError>,
{
    match catch_unwind(AssertUnwindSafe(func)) {
        Ok(Ok(())) => ptr::null_mut(),
        Ok(Err(err)) => capture_error(err.to_string()),
        Err(_) => capture_error("internal error: panic in profmerge".to_string()),
    }
}

unsafe fn input_bytes<'a>(ptr: *const c_char, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr as *const u8, len)
    }
}

/// # Safety
/// `result` must be a valid pointer. The returned manager must be released
/// with [`profmerge_destroy_merge_manager`].
#[no_mangle]
pub unsafe extern "C" fn profmerge_make_merge_manager(
    thread_count: c_int,
    result: *mut *mut MergeManager,
) -> *mut ProfmergeError {
    intercept(|| {
        let manager = MergeManager::new(thread_count.max(1) as u32);
        *result = Box::into_raw(Box::new(manager));
        Ok(())
    })
}

/// # Safety
/// `manager` must come from [`profmerge_make_merge_manager`] and not be
/// used afterwards.
#[no_mangle]
pub unsafe extern "C" fn profmerge_destroy_merge_manager(manager: *mut MergeManager) {
    if !manager.is_null() {
        drop(Box::from_raw(manager));
    }
}

/// Starts a merge session. `options_bytes` is a protobuf-serialized
/// `MergeOptions` message.
///
/// # Safety
/// `manager` must be a live manager handle, `options_bytes` must point to
/// `options_len` readable bytes and `result` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn profmerge_merger_start(
    manager: *mut MergeManager,
    options_bytes: *const c_char,
    options_len: usize,
    result: *mut *mut MergeSession,
) -> *mut ProfmergeError {
    intercept(|| {
        let manager = manager.as_ref().ok_or(ProfileError::Misuse)?;
        let options = schema::parse_merge_options(input_bytes(options_bytes, options_len))?;
        let session = manager.start_session(options);
        *result = Box::into_raw(Box::new(session));
        Ok(())
    })
}

/// Queues a profile into the session. The profile handle stays owned by
/// the caller.
///
/// # Safety
/// `session` and `profile` must be live handles.
#[no_mangle]
pub unsafe extern "C" fn profmerge_merger_add_profile(
    session: *mut MergeSession,
    profile: *mut Profile,
) -> *mut ProfmergeError {
    intercept(|| {
        let session = session.as_mut().ok_or(ProfileError::Misuse)?;
        let profile = profile.as_ref().ok_or(ProfileError::Misuse)?;
        session.add_profile(profile.clone())
    })
}

/// Finalizes the session and hands back the merged profile. The session is
/// spent but must still be released with [`profmerge_merger_dispose`].
///
/// # Safety
/// `session` must be a live session handle and `result` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn profmerge_merger_finish(
    session: *mut MergeSession,
    result: *mut *mut Profile,
) -> *mut ProfmergeError {
    intercept(|| {
        let session = session.as_mut().ok_or(ProfileError::Misuse)?;
        let profile = session.finish()?;
        *result = Box::into_raw(Box::new(profile));
        Ok(())
    })
}

/// # Safety
/// `session` must come from [`profmerge_merger_start`] and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn profmerge_merger_dispose(session: *mut MergeSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Parses a canonical profile from protobuf bytes.
///
/// # Safety
/// `bytes` must point to `len` readable bytes and `result` must be valid.
#[no_mangle]
pub unsafe extern "C" fn profmerge_profile_parse(
    bytes: *const c_char,
    len: usize,
    result: *mut *mut Profile,
) -> *mut ProfmergeError {
    intercept(|| {
        let profile = schema::parse_profile(input_bytes(bytes, len))?;
        *result = Box::into_raw(Box::new(profile));
        Ok(())
    })
}

/// Parses a legacy pprof profile from protobuf bytes and converts it to
/// canonical form.
///
/// # Safety
/// `bytes` must point to `len` readable bytes and `result` must be valid.
#[no_mangle]
pub unsafe extern "C" fn profmerge_profile_parse_pprof(
    bytes: *const c_char,
    len: usize,
    result: *mut *mut Profile,
) -> *mut ProfmergeError {
    intercept(|| {
        let pprof = schema::parse_pprof(input_bytes(bytes, len))?;
        let profile = crate::pprof::convert_from_pprof(&pprof)?;
        *result = Box::into_raw(Box::new(profile));
        Ok(())
    })
}

/// Serializes a canonical profile to protobuf bytes.
///
/// # Safety
/// `profile` must be a live profile handle and `result` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn profmerge_profile_serialize(
    profile: *mut Profile,
    result: *mut *mut ProfmergeString,
) -> *mut ProfmergeError {
    intercept(|| {
        let profile = profile.as_ref().ok_or(ProfileError::Misuse)?;
        let bytes = schema::serialize_profile(profile);
        *result = Box::into_raw(Box::new(ProfmergeString { bytes }));
        Ok(())
    })
}

/// Converts a canonical profile to the legacy pprof schema and serializes
/// it.
///
/// # Safety
/// `profile` must be a live profile handle and `result` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn profmerge_profile_serialize_pprof(
    profile: *mut Profile,
    result: *mut *mut ProfmergeString,
) -> *mut ProfmergeError {
    intercept(|| {
        let profile = profile.as_ref().ok_or(ProfileError::Misuse)?;
        let pprof = crate::pprof::convert_to_pprof(profile);
        let bytes = schema::serialize_pprof(&pprof);
        *result = Box::into_raw(Box::new(ProfmergeString { bytes }));
        Ok(())
    })
}

/// # Safety
/// `profile` must come from a profmerge entry point and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn profmerge_profile_dispose(profile: *mut Profile) {
    if !profile.is_null() {
        drop(Box::from_raw(profile));
    }
}

/// # Safety
/// `string` must be a live string handle; the pointer is valid until the
/// handle is disposed.
#[no_mangle]
pub unsafe extern "C" fn profmerge_string_data(string: *const ProfmergeString) -> *const c_char {
    match string.as_ref() {
        Some(string) => string.bytes.as_ptr() as *const c_char,
        None => ptr::null(),
    }
}

/// # Safety
/// `string` must be a live string handle.
#[no_mangle]
pub unsafe extern "C" fn profmerge_string_size(string: *const ProfmergeString) -> usize {
    match string.as_ref() {
        Some(string) => string.bytes.len(),
        None => 0,
    }
}

/// # Safety
/// `string` must come from a profmerge entry point and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn profmerge_string_dispose(string: *mut ProfmergeString) {
    if !string.is_null() {
        drop(Box::from_raw(string));
    }
}

/// Null-terminated error message; valid until the handle is disposed.
///
/// # Safety
/// `error` must be a live error handle.
#[no_mangle]
pub unsafe extern "C" fn profmerge_error_string(error: *const ProfmergeError) -> *const c_char {
    match error.as_ref() {
        Some(error) => error.message.as_ptr(),
        None => ptr::null(),
    }
}

/// # Safety
/// `error` must come from a profmerge entry point and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn profmerge_error_dispose(error: *mut ProfmergeError) {
    if !error.is_null() {
        drop(Box::from_raw(error));
    }
}
