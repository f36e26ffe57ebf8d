//! Error handling for the FFI boundary

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use xorshard_core::TransformError;
use xorshard_core::error::errno;

/// Error crossing the C ABI: a negative errno-style code plus a message
#[derive(Debug)]
pub struct FfiError {
    /// Status code returned to the caller (always negative)
    pub code: c_int,
    /// Human-readable detail
    pub message: String,
}

impl FfiError {
    /// Create an error, forcing the code negative
    pub fn new(code: c_int, message: impl Into<String>) -> Self {
        let code = if code < 0 { code } else { -errno::EIO };
        Self {
            code,
            message: message.into(),
        }
    }

    /// A pointer argument was null or did not hold a UTF-8 C string
    pub fn bad_pointer(argument: &str) -> Self {
        Self::new(
            -errno::EFAULT,
            format!("{argument}: null or not a valid UTF-8 C string"),
        )
    }

    /// An integer argument was out of range
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(-errno::EINVAL, message)
    }

    /// Convert error to a heap-allocated C string
    ///
    /// The caller must release it with `xorshard_free_string`.
    pub fn to_c_string(&self) -> *mut c_char {
        let sanitized = self.message.replace('\0', " ");
        match CString::new(sanitized) {
            Ok(message) => message.into_raw(),
            Err(_) => std::ptr::null_mut(),
        }
    }
}

impl From<TransformError> for FfiError {
    fn from(err: TransformError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

/// Helper macro for FFI error handling (for functions returning c_int codes)
///
/// Writes the error message to `error_out` if provided and returns the code.
#[macro_export]
macro_rules! ffi_try {
    ($result:expr, $error_out:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                let ffi_err: $crate::error::FfiError = err.into();
                if !$error_out.is_null() {
                    unsafe {
                        *$error_out = ffi_err.to_c_string();
                    }
                }
                return ffi_err.code;
            }
        }
    };
}
