//! Consistent timestamp metadata
//!
//! Entry points used by the posix fops to read and advance the per-file
//! timestamp record.
//!
//! # Read Path
//! 1. Check the inode cache (hit → return)
//! 2. Fetch the xattr, install on success
//! 3. Missing xattr + caller stat → bootstrap, persist, install
//!
//! # Write Path
//! 1. Load as above, under the inode lock
//! 2. Advance each selected field only if the incoming time is newer
//! 3. Persist the record, even when nothing moved
//!
//! Every update is flushed synchronously. If the flush fails the merged
//! record stays cached, so durable state can lag memory until the next
//! successful update.

use crate::handle::{HandleDir, HandleResolver, NoHandles};
use crate::inode::Inode;
use crate::store::{FileRef, MdataXattrStore};
use crate::xattr::SysXattr;
use mdstamp_common::config::StoreConfig;
use mdstamp_common::{
    Gfid, Iatt, MdataError, MdataFlag, MdataRecord, Result, SetAttrValid, Timespec,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Produces the first record of a file that has none on disk
///
/// The default takes the times straight from the stat. A layer that can
/// consult the other replicas before a record is created plugs in here.
pub trait Bootstrap: Send + Sync {
    fn bootstrap(&self, gfid: &Gfid, stat: &Iatt) -> MdataRecord;
}

/// Seeds the record from the observed stat
#[derive(Debug, Default, Clone, Copy)]
pub struct StatBootstrap;

impl Bootstrap for StatBootstrap {
    fn bootstrap(&self, _gfid: &Gfid, stat: &Iatt) -> MdataRecord {
        MdataRecord::from_iatt(stat)
    }
}

/// Timestamp metadata engine for one brick
pub struct PosixMdata {
    store: MdataXattrStore,
    bootstrap: Arc<dyn Bootstrap>,
}

impl PosixMdata {
    pub fn new(store: MdataXattrStore) -> Self {
        Self {
            store,
            bootstrap: Arc::new(StatBootstrap),
        }
    }

    /// Syscall-backed engine for the configured key and brick
    pub fn from_config(config: &StoreConfig) -> Self {
        let resolver: Arc<dyn HandleResolver> = match &config.brick_path {
            Some(brick) => Arc::new(HandleDir::new(brick)),
            None => Arc::new(NoHandles),
        };
        Self::new(MdataXattrStore::new(
            Arc::new(SysXattr::new()),
            resolver,
            config.xattr_key.clone(),
        ))
    }

    /// Replace the bootstrap policy
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn Bootstrap>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn store(&self) -> &MdataXattrStore {
        &self.store
    }

    fn check_inode(inode: &Inode) -> Result<()> {
        if inode.gfid().is_nil() {
            return Err(MdataError::invalid_argument("inode has no gfid"));
        }
        Ok(())
    }

    /// Cached record, else the persisted one (installed on the way)
    fn lookup(
        &self,
        inode: &Inode,
        slot: &mut Option<MdataRecord>,
        file: FileRef<'_>,
    ) -> Result<Option<MdataRecord>> {
        if let Some(record) = *slot {
            return Ok(Some(record));
        }
        let fetched = self.store.fetch(inode.gfid(), file)?;
        if fetched.is_some() {
            *slot = fetched;
        }
        Ok(fetched)
    }

    /// Read the current record, reflecting it into `stat`
    ///
    /// When no record exists and `stat` is given, a record is bootstrapped
    /// from it and persisted before being cached. Without a stat a missing
    /// record is reported as `Ok(None)` and nothing is cached.
    pub fn get_mdata(
        &self,
        inode: &Inode,
        file: FileRef<'_>,
        stat: Option<&mut Iatt>,
    ) -> Result<Option<MdataRecord>> {
        Self::check_inode(inode)?;
        let gfid = inode.gfid();
        let mut slot = inode.lock();

        let record = match self.lookup(inode, &mut slot, file)? {
            Some(record) => record,
            None => match stat.as_deref() {
                Some(seed) => {
                    let record = self.bootstrap.bootstrap(gfid, seed);
                    if let Err(e) = self.store.store(gfid, file, &record) {
                        error!(%gfid, key = %self.store.key(), "failed to store bootstrapped record: {e}");
                        return Err(e);
                    }
                    debug!(%gfid, %record, "bootstrapped timestamp record");
                    *slot = Some(record);
                    record
                }
                None => {
                    warn!(%gfid, key = %self.store.key(), "no timestamp record and no stat to seed one");
                    return Ok(None);
                }
            },
        };

        if let Some(stat) = stat {
            stat.apply_mdata(&record);
        }
        Ok(Some(record))
    }

    /// Merge `updates` into the file's record and persist it, under the lock
    fn merge(
        &self,
        inode: &Inode,
        file: FileRef<'_>,
        seed: Option<&Iatt>,
        updates: &[(Timespec, MdataFlag)],
    ) -> Result<MdataRecord> {
        Self::check_inode(inode)?;
        let gfid = inode.gfid();
        let mut slot = inode.lock();

        let (mut record, fresh) = match self.lookup(inode, &mut slot, file)? {
            Some(record) => (record, false),
            None => match seed {
                Some(seed) => (self.bootstrap.bootstrap(gfid, seed), true),
                None => return Err(MdataError::Missing(*gfid)),
            },
        };

        let mut changed = false;
        for &(time, flag) in updates {
            changed |= record.merge(time, flag);
        }
        // A fresh record is only cached once it is on disk; an existing one
        // keeps the merge even if the flush below fails.
        if !fresh {
            *slot = Some(record);
        }

        if let Err(e) = self.store.store(gfid, file, &record) {
            error!(%gfid, key = %self.store.key(), "failed to store timestamp record: {e}");
            return Err(e);
        }
        if fresh {
            *slot = Some(record);
        }

        debug!(%gfid, %record, changed, fresh, "merged timestamp record");
        Ok(record)
    }

    /// Advance the fields selected by `flag` to `time` where it is newer
    ///
    /// `stat`, when given, seeds a first-ever record and receives the merged
    /// times. With no record on disk and no stat this fails with
    /// [`MdataError::Missing`] rather than merging into zeroed times.
    pub fn set_mdata(
        &self,
        inode: &Inode,
        file: FileRef<'_>,
        time: Timespec,
        stat: Option<&mut Iatt>,
        flag: MdataFlag,
    ) -> Result<MdataRecord> {
        let record = self.merge(inode, file, stat.as_deref(), &[(time, flag)])?;
        if let Some(stat) = stat {
            stat.apply_mdata(&record);
        }
        Ok(record)
    }

    /// Record times set explicitly through setattr
    ///
    /// An atime update touches atime only; an mtime update moves mtime and
    /// ctime. Both may arrive together and are applied in one locked update.
    /// Returns `Ok(None)` if `valid` carries neither time.
    pub fn update_utime(
        &self,
        inode: &Inode,
        file: FileRef<'_>,
        stat: &Iatt,
        valid: SetAttrValid,
    ) -> Result<Option<MdataRecord>> {
        let mut updates = Vec::with_capacity(2);
        if valid.contains(SetAttrValid::ATIME) {
            updates.push((stat.atime, MdataFlag::ATIME));
        }
        if valid.contains(SetAttrValid::MTIME) {
            updates.push((stat.mtime, MdataFlag::modify()));
        }
        if updates.is_empty() {
            return Ok(None);
        }
        self.merge(inode, file, None, &updates).map(Some)
    }
}
