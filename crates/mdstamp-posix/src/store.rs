//! Attribute store for the timestamp record
//!
//! Fetches and stores the encoded record under a single xattr key. This is
//! the one place errors are classified and logged; callers above only see
//! typed results.

use crate::codec::{self, MDATA_DISK_SIZE};
use crate::handle::HandleResolver;
use crate::xattr::{ENOATTR, XattrBackend, XattrTarget};
use mdstamp_common::{Gfid, MdataError, MdataRecord, Result};
use nix::errno::Errno;
use std::borrow::Cow;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// How the caller can reach the file
#[derive(Clone, Copy, Debug)]
pub enum FileRef<'a> {
    /// Already-open descriptor; preferred, immune to concurrent renames
    Fd(BorrowedFd<'a>),
    /// Real path on the brick
    Path(&'a Path),
    /// Nothing at hand; resolve the GFID handle path
    Handle,
}

impl<'a> FileRef<'a> {
    /// Pick the best reference available: fd, then path, then handle
    pub fn prefer(fd: Option<BorrowedFd<'a>>, path: Option<&'a Path>) -> Self {
        match (fd, path) {
            (Some(fd), _) => Self::Fd(fd),
            (None, Some(path)) => Self::Path(path),
            (None, None) => Self::Handle,
        }
    }
}

/// A [`FileRef`] after handle resolution
enum Resolved<'a> {
    Fd(BorrowedFd<'a>),
    Path(Cow<'a, Path>),
}

impl Resolved<'_> {
    fn target(&self) -> XattrTarget<'_> {
        match self {
            Self::Fd(fd) => XattrTarget::Fd(*fd),
            Self::Path(p) => XattrTarget::Path(&**p),
        }
    }

    fn describe(&self) -> PathBuf {
        match self {
            Self::Fd(fd) => PathBuf::from(format!("<fd {}>", fd.as_raw_fd())),
            Self::Path(p) => p.to_path_buf(),
        }
    }
}

/// Set once the unsupported-xattr warning has been logged by any store
static UNSUPPORTED_WARNED: AtomicBool = AtomicBool::new(false);
static UNSUPPORTED_WARNINGS: AtomicU64 = AtomicU64::new(0);

/// Unsupported-xattr warnings emitted in this process (at most one)
pub fn unsupported_warnings() -> u64 {
    UNSUPPORTED_WARNINGS.load(Ordering::Relaxed)
}

fn is_unsupported(errno: Errno) -> bool {
    matches!(errno, Errno::EOPNOTSUPP | Errno::ENOSYS) || errno == Errno::ENOTSUP
}

/// Xattr-backed persistence of [`MdataRecord`]s
pub struct MdataXattrStore {
    backend: Arc<dyn XattrBackend>,
    resolver: Arc<dyn HandleResolver>,
    key: String,
    unsupported_hits: AtomicU64,
}

impl MdataXattrStore {
    pub fn new(
        backend: Arc<dyn XattrBackend>,
        resolver: Arc<dyn HandleResolver>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            resolver,
            key: key.into(),
            unsupported_hits: AtomicU64::new(0),
        }
    }

    /// Xattr key the record lives under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetches through this store that failed because xattrs are unsupported
    pub fn unsupported_hits(&self) -> u64 {
        self.unsupported_hits.load(Ordering::Relaxed)
    }

    fn resolve<'a>(&self, gfid: &Gfid, file: FileRef<'a>) -> Result<Resolved<'a>> {
        match file {
            FileRef::Fd(fd) => Ok(Resolved::Fd(fd)),
            FileRef::Path(p) => Ok(Resolved::Path(Cow::Borrowed(p))),
            FileRef::Handle => match self.resolver.resolve(gfid) {
                Some(p) => Ok(Resolved::Path(Cow::Owned(p))),
                None => {
                    warn!(%gfid, "lstat on gfid handle failed");
                    Err(MdataError::HandleUnavailable(*gfid))
                }
            },
        }
    }

    fn note_unsupported(&self) {
        self.unsupported_hits.fetch_add(1, Ordering::Relaxed);
        if !UNSUPPORTED_WARNED.swap(true, Ordering::Relaxed) {
            UNSUPPORTED_WARNINGS.fetch_add(1, Ordering::Relaxed);
            warn!("Extended attributes not supported (try remounting brick with 'user_xattr' flag)");
        }
    }

    /// Read the persisted record
    ///
    /// `Ok(None)` means the attribute is absent (legacy file or first use).
    pub fn fetch(&self, gfid: &Gfid, file: FileRef<'_>) -> Result<Option<MdataRecord>> {
        let resolved = self.resolve(gfid, file)?;

        let value = match self.backend.get(resolved.target(), &self.key) {
            Ok(value) => value,
            Err(errno) if is_unsupported(errno) => {
                self.note_unsupported();
                return Err(MdataError::Unsupported);
            }
            Err(errno) if errno == ENOATTR => {
                debug!(
                    path = %resolved.describe().display(),
                    %gfid,
                    key = %self.key,
                    "No such attribute"
                );
                return Ok(None);
            }
            Err(errno) => {
                let path = resolved.describe();
                error!(path = %path.display(), %gfid, key = %self.key, %errno, "getxattr failed");
                return Err(MdataError::Xattr {
                    op: "getxattr",
                    path,
                    errno,
                });
            }
        };

        codec::decode(&value).map(Some).inspect_err(|e| {
            error!(
                path = %resolved.describe().display(),
                %gfid,
                key = %self.key,
                size = value.len(),
                expected = MDATA_DISK_SIZE,
                "corrupt timestamp record: {e}"
            );
        })
    }

    /// Persist `record`, replacing any previous value in one call
    pub fn store(&self, gfid: &Gfid, file: FileRef<'_>, record: &MdataRecord) -> Result<()> {
        let resolved = self.resolve(gfid, file)?;
        let bytes = codec::encode(record);

        self.backend
            .set(resolved.target(), &self.key, &bytes)
            .map_err(|errno| {
                let path = resolved.describe();
                error!(path = %path.display(), %gfid, key = %self.key, %errno, "setxattr failed");
                MdataError::Xattr {
                    op: "setxattr",
                    path,
                    errno,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{HandleDir, NoHandles};
    use crate::testing::MemXattr;
    use mdstamp_common::{Iatt, Timespec};
    use std::os::fd::AsFd;

    const KEY: &str = "user.glusterfs.mdata";

    fn record() -> MdataRecord {
        MdataRecord::from_iatt(&Iatt::with_times(
            Gfid::NIL,
            Timespec::new(10, 0),
            Timespec::new(20, 0),
            Timespec::new(30, 0),
        ))
    }

    fn store_with(mem: &Arc<MemXattr>) -> MdataXattrStore {
        MdataXattrStore::new(mem.clone(), Arc::new(NoHandles), KEY)
    }

    #[test]
    fn test_store_then_fetch() {
        let mem = Arc::new(MemXattr::new());
        let store = store_with(&mem);
        let gfid = Gfid::new();
        let path = Path::new("/brick/a");

        assert!(store.fetch(&gfid, FileRef::Path(path)).unwrap().is_none());
        store.store(&gfid, FileRef::Path(path), &record()).unwrap();
        assert_eq!(
            store.fetch(&gfid, FileRef::Path(path)).unwrap(),
            Some(record())
        );
        assert_eq!(mem.raw("/brick/a", KEY).unwrap().len(), MDATA_DISK_SIZE);
    }

    #[test]
    fn test_fetch_unsupported_warns_once() {
        let mem = Arc::new(MemXattr::new());
        mem.fail_get(Some(Errno::EOPNOTSUPP));
        let store = store_with(&mem);
        let gfid = Gfid::new();

        for _ in 0..5 {
            let err = store
                .fetch(&gfid, FileRef::Path(Path::new("/brick/a")))
                .unwrap_err();
            assert!(matches!(err, MdataError::Unsupported));
        }
        mem.fail_get(Some(Errno::ENOSYS));
        assert!(matches!(
            store.fetch(&gfid, FileRef::Path(Path::new("/brick/b"))),
            Err(MdataError::Unsupported)
        ));

        assert_eq!(store.unsupported_hits(), 6);
        assert_eq!(unsupported_warnings(), 1);
    }

    #[test]
    fn test_unsupported_warns_once_across_stores() {
        let mem = Arc::new(MemXattr::new());
        mem.fail_get(Some(Errno::EOPNOTSUPP));
        let a = store_with(&mem);
        let b = MdataXattrStore::new(mem.clone(), Arc::new(NoHandles), "user.other.mdata");
        let gfid = Gfid::new();
        let path = Path::new("/brick/a");

        assert!(matches!(
            a.fetch(&gfid, FileRef::Path(path)),
            Err(MdataError::Unsupported)
        ));
        assert!(matches!(
            b.fetch(&gfid, FileRef::Path(path)),
            Err(MdataError::Unsupported)
        ));

        assert_eq!(a.unsupported_hits(), 1);
        assert_eq!(b.unsupported_hits(), 1);
        assert_eq!(unsupported_warnings(), 1);
    }

    #[test]
    fn test_fetch_other_error() {
        let mem = Arc::new(MemXattr::new());
        mem.fail_get(Some(Errno::EIO));
        let store = store_with(&mem);

        let err = store
            .fetch(&Gfid::new(), FileRef::Path(Path::new("/brick/a")))
            .unwrap_err();
        match err {
            MdataError::Xattr { op, path, errno } => {
                assert_eq!(op, "getxattr");
                assert_eq!(path, PathBuf::from("/brick/a"));
                assert_eq!(errno, Errno::EIO);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.unsupported_hits(), 0);
    }

    #[test]
    fn test_fetch_malformed() {
        let mem = Arc::new(MemXattr::new());
        mem.put_raw("/brick/a", KEY, vec![1u8; 12]);
        let store = store_with(&mem);

        assert!(matches!(
            store.fetch(&Gfid::new(), FileRef::Path(Path::new("/brick/a"))),
            Err(MdataError::Malformed {
                expected: MDATA_DISK_SIZE,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_store_failure_is_hard_error() {
        let mem = Arc::new(MemXattr::new());
        mem.fail_set(Some(Errno::ENOSPC));
        let store = store_with(&mem);

        let err = store
            .store(&Gfid::new(), FileRef::Path(Path::new("/brick/a")), &record())
            .unwrap_err();
        assert!(matches!(
            err,
            MdataError::Xattr {
                op: "setxattr",
                errno: Errno::ENOSPC,
                ..
            }
        ));
        assert_eq!(mem.sets(), 1);
    }

    #[test]
    fn test_handle_resolution() {
        let brick = tempfile::tempdir().unwrap();
        let dirs = HandleDir::new(brick.path());
        let gfid = Gfid::new();
        let handle = dirs.handle_path(&gfid);

        let mem = Arc::new(MemXattr::new());
        let store = MdataXattrStore::new(mem.clone(), Arc::new(dirs), KEY);

        assert!(matches!(
            store.fetch(&gfid, FileRef::Handle),
            Err(MdataError::HandleUnavailable(g)) if g == gfid
        ));
        assert_eq!(mem.gets(), 0);

        std::fs::create_dir_all(handle.parent().unwrap()).unwrap();
        std::fs::write(&handle, b"").unwrap();
        store.store(&gfid, FileRef::Handle, &record()).unwrap();
        assert!(mem.raw(&handle.to_string_lossy(), KEY).is_some());
    }

    #[test]
    fn test_prefer_fd_over_path() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_fd();
        assert!(matches!(
            FileRef::prefer(Some(fd), Some(Path::new("/brick/a"))),
            FileRef::Fd(_)
        ));
        assert!(matches!(
            FileRef::prefer(None, Some(Path::new("/brick/a"))),
            FileRef::Path(_)
        ));
        assert!(matches!(FileRef::prefer(None, None), FileRef::Handle));
    }
}
