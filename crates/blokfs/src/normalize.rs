//! Syscall result normalization.
//!
//! Raw libc return values are converted into `io::Result` right at the call
//! site, so the thread's errno is captured before anything else can run.
//! Handlers return `Result<T, FsError>`, and the transport binding replies
//! with [`FsError::to_errno`] on failure.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{FsError, Result};

/// Integer-like libc return values where `-1` signals failure.
pub trait IsMinusOne: Copy {
    /// Whether the value is the failure sentinel.
    fn is_minus_one(self) -> bool;
}

macro_rules! impl_is_minus_one {
    ($($t:ty)*) => {$(
        impl IsMinusOne for $t {
            fn is_minus_one(self) -> bool {
                self == -1
            }
        }
    )*};
}

impl_is_minus_one! { i32 i64 isize }

/// Converts a libc return value into an `io::Result`, reading errno
/// immediately when the call failed.
pub fn cvt<T: IsMinusOne>(ret: T) -> io::Result<T> {
    if ret.is_minus_one() {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Builds the NUL-terminated form of a path for libc calls.
pub fn cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| FsError::invalid(format!("path contains a NUL byte: {}", path.display())))
}

/// Same as [`cstring`] for attribute names and other raw strings.
pub fn cstring_bytes(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| FsError::invalid("argument contains a NUL byte"))
}

/// Clears the calling thread's errno. Needed before `readdir(3)`, which
/// reports both end-of-stream and failure by returning NULL.
pub(crate) fn clear_errno() {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe {
        *libc::__error() = 0;
    }
}
