//! In-memory xattr backend for unit tests

use crate::xattr::{ENOATTR, XattrBackend, XattrTarget};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};

/// Attribute map keyed by (file, name) with call counters and fault injection
#[derive(Default)]
pub struct MemXattr {
    attrs: Mutex<HashMap<(String, String), Vec<u8>>>,
    get_error: Mutex<Option<Errno>>,
    set_error: Mutex<Option<Errno>>,
    gets: AtomicU64,
    sets: AtomicU64,
}

fn file_key(target: XattrTarget<'_>) -> String {
    match target {
        XattrTarget::Fd(fd) => format!("<fd {}>", fd.as_raw_fd()),
        XattrTarget::Path(p) => p.to_string_lossy().into_owned(),
    }
}

impl MemXattr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get(&self, errno: Option<Errno>) {
        *self.get_error.lock() = errno;
    }

    pub fn fail_set(&self, errno: Option<Errno>) {
        *self.set_error.lock() = errno;
    }

    pub fn put_raw(&self, file: &str, name: &str, value: Vec<u8>) {
        self.attrs
            .lock()
            .insert((file.to_string(), name.to_string()), value);
    }

    pub fn raw(&self, file: &str, name: &str) -> Option<Vec<u8>> {
        self.attrs
            .lock()
            .get(&(file.to_string(), name.to_string()))
            .cloned()
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::SeqCst)
    }
}

impl XattrBackend for MemXattr {
    fn get(&self, target: XattrTarget<'_>, name: &str) -> Result<Vec<u8>, Errno> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(errno) = *self.get_error.lock() {
            return Err(errno);
        }
        self.attrs
            .lock()
            .get(&(file_key(target), name.to_string()))
            .cloned()
            .ok_or(ENOATTR)
    }

    fn set(&self, target: XattrTarget<'_>, name: &str, value: &[u8]) -> Result<(), Errno> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if let Some(errno) = *self.set_error.lock() {
            return Err(errno);
        }
        self.attrs
            .lock()
            .insert((file_key(target), name.to_string()), value.to_vec());
        Ok(())
    }
}
