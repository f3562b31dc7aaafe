//! Raw extended attribute primitives
//!
//! Thin wrappers over the platform getxattr/setxattr calls. Path based calls
//! never follow symlinks (`l*xattr` on Linux, `XATTR_NOFOLLOW` on macOS).
//! Errors are returned as raw errnos; classification happens in the store.

use nix::errno::Errno;
use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Errno reported for an absent attribute
#[cfg(target_os = "linux")]
pub const ENOATTR: Errno = Errno::ENODATA;
#[cfg(target_os = "macos")]
pub const ENOATTR: Errno = Errno::ENOATTR;

/// Where an attribute call is directed
#[derive(Clone, Copy, Debug)]
pub enum XattrTarget<'a> {
    Fd(BorrowedFd<'a>),
    Path(&'a Path),
}

/// Get/set primitives of the underlying filesystem
pub trait XattrBackend: Send + Sync {
    /// Read the whole value of `name`
    fn get(&self, target: XattrTarget<'_>, name: &str) -> Result<Vec<u8>, Errno>;

    /// Create or replace `name` with `value` in a single call
    fn set(&self, target: XattrTarget<'_>, name: &str, value: &[u8]) -> Result<(), Errno>;
}

/// Syscall-backed implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SysXattr;

impl SysXattr {
    pub fn new() -> Self {
        Self
    }
}

fn cstr(bytes: &[u8]) -> Result<CString, Errno> {
    CString::new(bytes).map_err(|_| Errno::EINVAL)
}

impl XattrBackend for SysXattr {
    fn get(&self, target: XattrTarget<'_>, name: &str) -> Result<Vec<u8>, Errno> {
        let name = cstr(name.as_bytes())?;
        let path = match target {
            XattrTarget::Path(p) => Some(cstr(p.as_os_str().as_bytes())?),
            XattrTarget::Fd(_) => None,
        };

        // The value may be resized between the probe and the read; retry
        // until the read fits the probed size.
        loop {
            let size = raw::get(target, path.as_deref(), &name, &mut [])?;
            let mut buf = vec![0u8; size];
            match raw::get(target, path.as_deref(), &name, &mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(Errno::ERANGE) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn set(&self, target: XattrTarget<'_>, name: &str, value: &[u8]) -> Result<(), Errno> {
        let name = cstr(name.as_bytes())?;
        let path = match target {
            XattrTarget::Path(p) => Some(cstr(p.as_os_str().as_bytes())?),
            XattrTarget::Fd(_) => None,
        };
        raw::set(target, path.as_deref(), &name, value)
    }
}

#[cfg(target_os = "linux")]
mod raw {
    use super::*;
    use std::ffi::CStr;

    pub(super) fn get(
        target: XattrTarget<'_>,
        path: Option<&CStr>,
        name: &CStr,
        buf: &mut [u8],
    ) -> Result<usize, Errno> {
        let (ptr, len) = if buf.is_empty() {
            (std::ptr::null_mut(), 0)
        } else {
            (buf.as_mut_ptr().cast::<libc::c_void>(), buf.len())
        };
        let res = match (target, path) {
            (XattrTarget::Fd(fd), _) => unsafe {
                libc::fgetxattr(fd.as_raw_fd(), name.as_ptr(), ptr, len)
            },
            (XattrTarget::Path(_), Some(path)) => unsafe {
                libc::lgetxattr(path.as_ptr(), name.as_ptr(), ptr, len)
            },
            (XattrTarget::Path(_), None) => return Err(Errno::EINVAL),
        };
        Errno::result(res).map(|n| n as usize)
    }

    pub(super) fn set(
        target: XattrTarget<'_>,
        path: Option<&CStr>,
        name: &CStr,
        value: &[u8],
    ) -> Result<(), Errno> {
        let ptr = value.as_ptr().cast::<libc::c_void>();
        let res = match (target, path) {
            (XattrTarget::Fd(fd), _) => unsafe {
                libc::fsetxattr(fd.as_raw_fd(), name.as_ptr(), ptr, value.len(), 0)
            },
            (XattrTarget::Path(_), Some(path)) => unsafe {
                libc::lsetxattr(path.as_ptr(), name.as_ptr(), ptr, value.len(), 0)
            },
            (XattrTarget::Path(_), None) => return Err(Errno::EINVAL),
        };
        Errno::result(res).map(drop)
    }
}

#[cfg(target_os = "macos")]
mod raw {
    use super::*;
    use std::ffi::CStr;

    pub(super) fn get(
        target: XattrTarget<'_>,
        path: Option<&CStr>,
        name: &CStr,
        buf: &mut [u8],
    ) -> Result<usize, Errno> {
        let (ptr, len) = if buf.is_empty() {
            (std::ptr::null_mut(), 0)
        } else {
            (buf.as_mut_ptr().cast::<libc::c_void>(), buf.len())
        };
        let res = match (target, path) {
            (XattrTarget::Fd(fd), _) => unsafe {
                libc::fgetxattr(fd.as_raw_fd(), name.as_ptr(), ptr, len, 0, 0)
            },
            (XattrTarget::Path(_), Some(path)) => unsafe {
                libc::getxattr(
                    path.as_ptr(),
                    name.as_ptr(),
                    ptr,
                    len,
                    0,
                    libc::XATTR_NOFOLLOW,
                )
            },
            (XattrTarget::Path(_), None) => return Err(Errno::EINVAL),
        };
        Errno::result(res).map(|n| n as usize)
    }

    pub(super) fn set(
        target: XattrTarget<'_>,
        path: Option<&CStr>,
        name: &CStr,
        value: &[u8],
    ) -> Result<(), Errno> {
        let ptr = value.as_ptr().cast::<libc::c_void>();
        let res = match (target, path) {
            (XattrTarget::Fd(fd), _) => unsafe {
                libc::fsetxattr(fd.as_raw_fd(), name.as_ptr(), ptr, value.len(), 0, 0)
            },
            (XattrTarget::Path(_), Some(path)) => unsafe {
                libc::setxattr(
                    path.as_ptr(),
                    name.as_ptr(),
                    ptr,
                    value.len(),
                    0,
                    libc::XATTR_NOFOLLOW,
                )
            },
            (XattrTarget::Path(_), None) => return Err(Errno::EINVAL),
        };
        Errno::result(res).map(drop)
    }
}
