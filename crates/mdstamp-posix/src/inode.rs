//! In-process file identity carrying the cached timestamp record

use mdstamp_common::{Gfid, MdataRecord};
use parking_lot::{Mutex, MutexGuard};

/// In-memory identity of a brick file
///
/// The cached record lives here and nowhere else, so it is dropped together
/// with the inode. The mutex is the per-file metadata lock: it is held across
/// load, merge and persist, serializing every update of this one file while
/// leaving unrelated files uncontended.
#[derive(Debug)]
pub struct Inode {
    gfid: Gfid,
    mdata: Mutex<Option<MdataRecord>>,
}

impl Inode {
    pub fn new(gfid: Gfid) -> Self {
        Self {
            gfid,
            mdata: Mutex::new(None),
        }
    }

    pub fn gfid(&self) -> &Gfid {
        &self.gfid
    }

    /// Current cache entry, if populated
    pub fn cached(&self) -> Option<MdataRecord> {
        *self.mdata.lock()
    }

    /// Drop the cache entry; the next access reloads from the xattr
    pub fn invalidate(&self) {
        self.mdata.lock().take();
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<MdataRecord>> {
        self.mdata.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdstamp_common::{Iatt, Timespec};

    #[test]
    fn test_inode_slot() {
        let inode = Inode::new(Gfid::new());
        assert!(inode.cached().is_none());

        let rec = MdataRecord::from_iatt(&Iatt::with_times(
            *inode.gfid(),
            Timespec::new(1, 0),
            Timespec::new(2, 0),
            Timespec::new(3, 0),
        ));
        *inode.lock() = Some(rec);
        assert_eq!(inode.cached(), Some(rec));

        inode.invalidate();
        assert!(inode.cached().is_none());
    }
}
