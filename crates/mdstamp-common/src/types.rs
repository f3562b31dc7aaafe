//! Core type definitions for mdstamp
//!
//! This module defines the timestamp record persisted on every brick file,
//! the stat view it is reflected into, and the selectors used to merge
//! incoming times into it.

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current layout version of the persisted record
pub const MDATA_VERSION: u8 = 1;

/// Durable, location-independent identity of a file (GlusterFS GFID)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct Gfid(Uuid);

impl Gfid {
    /// The all-zero GFID, never assigned to a real file
    pub const NIL: Self = Self(Uuid::nil());

    /// Generate a new random GFID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// True for the nil GFID
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

/// Defaults to [`Gfid::NIL`]; use [`Gfid::new`] for a fresh identity
impl Default for Gfid {
    fn default() -> Self {
        Self::NIL
    }
}

impl FromStr for Gfid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Debug for Gfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gfid({})", self.0)
    }
}

impl fmt::Display for Gfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (seconds, nanoseconds) point in time
///
/// Ordered by seconds, then nanoseconds. Both halves are signed 64-bit and
/// the ordering holds over their full range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    #[must_use]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }
}

impl Ord for Timespec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sec
            .cmp(&other.sec)
            .then_with(|| self.nsec.cmp(&other.nsec))
    }
}

impl PartialOrd for Timespec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Timestamp record kept per file
///
/// One authoritative copy lives in the file's inode; the durable copy is
/// the fixed-size xattr written by the posix layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdataRecord {
    /// Persisted layout version
    pub version: u8,
    /// Reserved, passed through unchanged
    pub flags: u64,
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub atime: Timespec,
}

impl MdataRecord {
    /// Synthesize a first record from an observed stat
    #[must_use]
    pub fn from_iatt(stat: &Iatt) -> Self {
        Self {
            version: MDATA_VERSION,
            flags: 0,
            ctime: stat.ctime,
            mtime: stat.mtime,
            atime: stat.atime,
        }
    }

    /// Advance every field selected by `flag` to `time` if `time` is newer.
    ///
    /// Returns true if any field moved.
    pub fn merge(&mut self, time: Timespec, flag: MdataFlag) -> bool {
        let mut changed = false;
        for (selected, field) in [
            (flag.ctime, &mut self.ctime),
            (flag.mtime, &mut self.mtime),
            (flag.atime, &mut self.atime),
        ] {
            if selected && time > *field {
                *field = time;
                changed = true;
            }
        }
        changed
    }
}

impl fmt::Display for MdataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} flags={:#x} ctime={} mtime={} atime={}",
            self.version, self.flags, self.ctime, self.mtime, self.atime
        )
    }
}

/// Stat view of a brick file as returned to callers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iatt {
    pub gfid: Gfid,
    pub ino: u64,
    pub size: u64,
    pub mode: u32,
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub atime: Timespec,
}

impl Iatt {
    /// Stat view with only the three times populated
    #[must_use]
    pub fn with_times(gfid: Gfid, atime: Timespec, mtime: Timespec, ctime: Timespec) -> Self {
        Self {
            gfid,
            ino: 0,
            size: 0,
            mode: 0,
            ctime,
            mtime,
            atime,
        }
    }

    /// Build from `lstat`/`fstat` output
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(gfid: Gfid, meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            gfid,
            ino: meta.ino(),
            size: meta.size(),
            mode: meta.mode(),
            ctime: Timespec::new(meta.ctime(), meta.ctime_nsec()),
            mtime: Timespec::new(meta.mtime(), meta.mtime_nsec()),
            atime: Timespec::new(meta.atime(), meta.atime_nsec()),
        }
    }

    /// Overwrite the three times with the record's values
    pub fn apply_mdata(&mut self, mdata: &MdataRecord) {
        self.ctime = mdata.ctime;
        self.mtime = mdata.mtime;
        self.atime = mdata.atime;
    }
}

/// Which record fields a merge may advance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MdataFlag {
    pub ctime: bool,
    pub mtime: bool,
    pub atime: bool,
}

impl MdataFlag {
    pub const NONE: Self = Self::new(false, false, false);
    pub const CTIME: Self = Self::new(true, false, false);
    pub const MTIME: Self = Self::new(false, true, false);
    pub const ATIME: Self = Self::new(false, false, true);
    pub const ALL: Self = Self::new(true, true, true);

    #[must_use]
    pub const fn new(ctime: bool, mtime: bool, atime: bool) -> Self {
        Self {
            ctime,
            mtime,
            atime,
        }
    }

    /// Content change: mtime moves and ctime with it
    #[must_use]
    pub const fn modify() -> Self {
        Self::new(true, true, false)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.ctime || self.mtime || self.atime)
    }
}

/// Setattr validity mask as passed down by the dispatch layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SetAttrValid(u32);

impl SetAttrValid {
    pub const MODE: Self = Self(0x01);
    pub const UID: Self = Self(0x02);
    pub const GID: Self = Self(0x04);
    pub const SIZE: Self = Self(0x08);
    pub const ATIME: Self = Self(0x10);
    pub const MTIME: Self = Self(0x20);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SetAttrValid {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn test_timespec_ordering() {
        assert!(Timespec::new(1, 0) < Timespec::new(2, 0));
        assert!(Timespec::new(200, 100) < Timespec::new(200, 500));
        assert!(Timespec::new(-1, 999_999_999) < Timespec::new(0, 0));
        assert_eq!(
            Timespec::new(7, 7).cmp(&Timespec::new(7, 7)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_timespec_ordering_full_range() {
        // A subtraction-based compare would overflow on every one of these
        assert!(Timespec::new(i64::MIN, 0) < Timespec::new(i64::MAX, 0));
        assert!(Timespec::new(i64::MAX, 0) > Timespec::new(-1, 0));
        assert!(Timespec::new(0, i64::MIN) < Timespec::new(0, i64::MAX));
        assert!(Timespec::new(5, i64::MAX) < Timespec::new(6, i64::MIN));
    }

    #[test]
    fn test_merge_only_advances() {
        let mut rec = MdataRecord {
            version: MDATA_VERSION,
            flags: 0,
            ctime: Timespec::new(100, 0),
            mtime: Timespec::new(200, 500),
            atime: Timespec::new(10, 0),
        };

        assert!(rec.merge(Timespec::new(150, 0), MdataFlag::CTIME));
        assert_eq!(rec.ctime, Timespec::new(150, 0));

        assert!(!rec.merge(Timespec::new(200, 100), MdataFlag::MTIME));
        assert_eq!(rec.mtime, Timespec::new(200, 500));

        // equal is not newer
        assert!(!rec.merge(Timespec::new(10, 0), MdataFlag::ATIME));
        assert!(!rec.merge(Timespec::new(999, 0), MdataFlag::NONE));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let times: Vec<Timespec> = (0..64)
            .map(|i| Timespec::new(i / 4, (i % 4) * 250_000_000))
            .collect();
        let max = *times.iter().max().unwrap();

        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let mut order = times.clone();
            order.shuffle(&mut rng);

            let mut rec = MdataRecord::from_iatt(&Iatt::default());
            for t in order {
                rec.merge(t, MdataFlag::ALL);
            }
            assert_eq!(rec.ctime, max);
            assert_eq!(rec.mtime, max);
            assert_eq!(rec.atime, max);
        }
    }

    #[test]
    fn test_record_from_iatt() {
        let stat = Iatt::with_times(
            Gfid::new(),
            Timespec::new(10, 0),
            Timespec::new(20, 0),
            Timespec::new(30, 0),
        );
        let rec = MdataRecord::from_iatt(&stat);
        assert_eq!(rec.version, 1);
        assert_eq!(rec.flags, 0);
        assert_eq!(rec.atime, Timespec::new(10, 0));
        assert_eq!(rec.mtime, Timespec::new(20, 0));
        assert_eq!(rec.ctime, Timespec::new(30, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_iatt_from_metadata() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let meta = std::fs::symlink_metadata(file.path()).unwrap();
        let iatt = Iatt::from_metadata(Gfid::NIL, &meta);
        assert!(iatt.ino != 0);
        assert!(iatt.mtime.sec > 0);
    }

    #[test]
    fn test_setattr_valid() {
        let valid = SetAttrValid::ATIME | SetAttrValid::MTIME;
        assert!(valid.contains(SetAttrValid::ATIME));
        assert!(valid.contains(SetAttrValid::MTIME));
        assert!(!valid.contains(SetAttrValid::SIZE));
        assert!(!SetAttrValid::empty().contains(SetAttrValid::ATIME));
    }

    #[test]
    fn test_gfid_parse_display() {
        let gfid: Gfid = "c4a5f1de-7c3b-4a47-9f58-7f6b9b0a1e22".parse().unwrap();
        assert_eq!(gfid.to_string(), "c4a5f1de-7c3b-4a47-9f58-7f6b9b0a1e22");
        assert!(!gfid.is_nil());
        assert!(Gfid::NIL.is_nil());
    }

    #[test]
    fn test_defaults_are_nil() {
        assert_eq!(Gfid::default(), Gfid::NIL);
        assert!(Iatt::default().gfid.is_nil());
        assert_eq!(Iatt::default(), Iatt::default());
        assert_ne!(Gfid::new(), Gfid::new());
    }
}
