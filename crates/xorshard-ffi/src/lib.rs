//! # xorshard-ffi - C-compatible FFI bindings
//!
//! Stable C ABI over the xorshard transform engine. The entry point mirrors
//! a classic syscall shape: three path strings and a thread count in, `0` or
//! a negative errno-style status out.
//!
//! ## Safety
//!
//! Callers must ensure:
//! - Path arguments are null or point to null-terminated strings; null and
//!   non-UTF-8 paths are reported as `-14`
//! - `error_out`, if non-null, points to writable storage for one pointer
//!
//! ## Memory Management
//!
//! - Error strings written to `error_out` are owned by the caller and must be
//!   freed with `xorshard_free_string()`
//! - The version string is static and must not be freed

// FFI code inherently requires unsafe operations within unsafe functions
#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use xorshard_core::{Coordinator, Job};

pub mod error;

pub use error::FfiError;

/// Initialize the xorshard FFI library
///
/// Installs a log subscriber honoring `RUST_LOG`. Optional; returns 0.
///
/// # Safety
///
/// Safe to call multiple times (idempotent).
#[unsafe(no_mangle)]
pub extern "C" fn xorshard_init() -> c_int {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    0
}

/// Get the version string of the xorshard library
///
/// Returns a pointer to a static null-terminated string.
/// Caller must NOT free this pointer.
#[unsafe(no_mangle)]
pub extern "C" fn xorshard_version() -> *const c_char {
    const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

/// Free a string returned by xorshard FFI functions
///
/// # Safety
///
/// - `s` must be a pointer returned by an xorshard FFI function, or null
/// - `s` must not be used after this call
/// - `s` must not be freed multiple times
#[unsafe(no_mangle)]
pub unsafe extern "C" fn xorshard_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// XOR `input_path` with the repeating key in `key_path` into `output_path`
///
/// Splits the input across `thread_count` worker threads and blocks until
/// the output has been written. The transform is its own inverse, so this
/// one call serves for both encryption and decryption.
///
/// Returns 0 on success or a negative errno-style status. On failure, if
/// `error_out` is non-null it receives a message the caller must free with
/// `xorshard_free_string()`.
///
/// # Safety
///
/// - Each path must be null or a valid null-terminated string
/// - `error_out` must be null or valid for a single pointer write
#[unsafe(no_mangle)]
pub unsafe extern "C" fn xorshard_transform_file(
    input_path: *const c_char,
    output_path: *const c_char,
    key_path: *const c_char,
    thread_count: c_int,
    error_out: *mut *mut c_char,
) -> c_int {
    let input = ffi_try!(
        from_c_string(input_path).ok_or_else(|| FfiError::bad_pointer("input_path")),
        error_out
    );
    let output = ffi_try!(
        from_c_string(output_path).ok_or_else(|| FfiError::bad_pointer("output_path")),
        error_out
    );
    let key = ffi_try!(
        from_c_string(key_path).ok_or_else(|| FfiError::bad_pointer("key_path")),
        error_out
    );
    let threads = ffi_try!(
        usize::try_from(thread_count).map_err(|_| {
            FfiError::invalid_argument(format!("invalid thread count: {thread_count}"))
        }),
        error_out
    );

    let job = Job::new(input, output, key, threads);
    let mut coordinator = Coordinator::default();
    ffi_try!(coordinator.run(&job), error_out);

    0
}

/// Helper to convert C string to Rust String
///
/// # Safety
///
/// - `s` must be null or a valid null-terminated string
pub(crate) unsafe fn from_c_string(s: *const c_char) -> Option<String> {
    if s.is_null() {
        None
    } else {
        CStr::from_ptr(s).to_str().ok().map(ToString::to_string)
    }
}
