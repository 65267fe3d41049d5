//! Extended attribute pass-through.
//!
//! All four calls use the variants that act on a symlink itself rather than
//! on its target. The module only exists on platforms that have them;
//! elsewhere `Passthrough` offers no extended attribute capability at all.

use std::ffi::{CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::normalize::{cstring, cstring_bytes};
use crate::operations::{XattrOperations, XattrReply};
use crate::passthrough::Passthrough;
use crate::session::MountSession;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod sys {
    use std::ffi::CStr;
    use std::io;

    use crate::normalize::cvt;

    pub fn set(path: &CStr, name: &CStr, value: &[u8], flags: i32) -> io::Result<()> {
        cvt(unsafe {
            libc::lsetxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                flags,
            )
        })
        .map(drop)
    }

    pub fn get(path: &CStr, name: &CStr, buf: &mut [u8]) -> io::Result<usize> {
        let n = cvt(unsafe {
            libc::lgetxattr(path.as_ptr(), name.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
        })?;
        Ok(n as usize)
    }

    pub fn list(path: &CStr, buf: &mut [u8]) -> io::Result<usize> {
        let n =
            cvt(unsafe { libc::llistxattr(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) })?;
        Ok(n as usize)
    }

    pub fn remove(path: &CStr, name: &CStr) -> io::Result<()> {
        cvt(unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) }).map(drop)
    }
}

#[cfg(target_os = "macos")]
mod sys {
    use std::ffi::CStr;
    use std::io;

    use crate::normalize::cvt;

    pub fn set(path: &CStr, name: &CStr, value: &[u8], flags: i32) -> io::Result<()> {
        cvt(unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
                flags | libc::XATTR_NOFOLLOW,
            )
        })
        .map(drop)
    }

    pub fn get(path: &CStr, name: &CStr, buf: &mut [u8]) -> io::Result<usize> {
        let n = cvt(unsafe {
            libc::getxattr(
                path.as_ptr(),
                name.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                libc::XATTR_NOFOLLOW,
            )
        })?;
        Ok(n as usize)
    }

    pub fn list(path: &CStr, buf: &mut [u8]) -> io::Result<usize> {
        let n = cvt(unsafe {
            libc::listxattr(
                path.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::XATTR_NOFOLLOW,
            )
        })?;
        Ok(n as usize)
    }

    pub fn remove(path: &CStr, name: &CStr) -> io::Result<()> {
        cvt(unsafe { libc::removexattr(path.as_ptr(), name.as_ptr(), libc::XATTR_NOFOLLOW) })
            .map(drop)
    }
}

/// Runs a size query when `size` is 0, otherwise fills a buffer of `size`
/// bytes. A value larger than `size` fails with `ERANGE` from the kernel.
fn sized<F>(size: u32, mut call: F) -> Result<XattrReply>
where
    F: FnMut(&mut [u8]) -> std::io::Result<usize>,
{
    if size == 0 {
        let needed = call(&mut [])?;
        return Ok(XattrReply::Size(needed as u32));
    }
    let mut buf = vec![0u8; size as usize];
    let n = call(&mut buf)?;
    buf.truncate(n);
    Ok(XattrReply::Data(buf))
}

fn name_cstr(name: &OsStr) -> Result<std::ffi::CString> {
    cstring_bytes(name.as_bytes())
}

impl XattrOperations for Passthrough {
    fn setxattr(
        &self,
        cx: &MountSession,
        path: &Path,
        name: &OsStr,
        value: &[u8],
        flags: i32,
    ) -> Result<()> {
        let c_path = cstring(&cx.resolve(path)?)?;
        let c_name = name_cstr(name)?;
        debug!("setxattr {} {:?} len={}", path.display(), name, value.len());
        sys::set(&c_path, &c_name, value, flags)?;
        Ok(())
    }

    fn getxattr(
        &self,
        cx: &MountSession,
        path: &Path,
        name: &OsStr,
        size: u32,
    ) -> Result<XattrReply> {
        let c_path = cstring(&cx.resolve(path)?)?;
        let c_name = name_cstr(name)?;
        sized(size, |buf| sys::get(&c_path, &c_name, buf))
    }

    fn listxattr(&self, cx: &MountSession, path: &Path, size: u32) -> Result<XattrReply> {
        let c_path = cstring(&cx.resolve(path)?)?;
        sized(size, |buf| sys::list(&c_path, buf))
    }

    fn removexattr(&self, cx: &MountSession, path: &Path, name: &OsStr) -> Result<()> {
        let c_path = cstring(&cx.resolve(path)?)?;
        let c_name = name_cstr(name)?;
        sys::remove(&c_path, &c_name)?;
        Ok(())
    }
}

/// Splits a `listxattr` buffer into attribute names.
pub fn split_names(list: &[u8]) -> Vec<&CStr> {
    list.split_inclusive(|&b| b == 0)
        .filter_map(|chunk| CStr::from_bytes_with_nul(chunk).ok())
        .collect()
}
