//! On-disk layout of the timestamp record
//!
//! ```text
//! +---------+----------+------------+-------------+------------+-------------+------------+-------------+
//! | version |  flags   | ctime.sec  | ctime.nsec  | mtime.sec  | mtime.nsec  | atime.sec  | atime.nsec  |
//! |  1 (u8) |  8 (BE)  |   8 (BE)   |   8 (BE)    |   8 (BE)   |   8 (BE)    |   8 (BE)   |   8 (BE)    |
//! +---------+----------+------------+-------------+------------+-------------+------------+-------------+
//! ```
//!
//! `version` is one raw byte so it has no byte order; every other field is
//! big-endian regardless of the host.

use bytes::{Buf, BufMut};
use mdstamp_common::{MDATA_VERSION, MdataError, MdataRecord, Result, Timespec};

/// Size of the encoded record in bytes
pub const MDATA_DISK_SIZE: usize = 1 + 8 * 7;

/// Encode a record into its persisted form
pub fn encode(record: &MdataRecord) -> [u8; MDATA_DISK_SIZE] {
    let mut buf = [0u8; MDATA_DISK_SIZE];
    let mut cursor = &mut buf[..];

    cursor.put_u8(record.version);
    cursor.put_u64(record.flags);
    for ts in [record.ctime, record.mtime, record.atime] {
        cursor.put_i64(ts.sec);
        cursor.put_i64(ts.nsec);
    }

    buf
}

/// Decode a persisted record
///
/// Fails on any length other than [`MDATA_DISK_SIZE`] and on an unknown
/// version; never yields a partially filled record.
pub fn decode(data: &[u8]) -> Result<MdataRecord> {
    if data.len() != MDATA_DISK_SIZE {
        return Err(MdataError::Malformed {
            expected: MDATA_DISK_SIZE,
            actual: data.len(),
        });
    }

    let mut buf = data;
    let version = buf.get_u8();
    if version != MDATA_VERSION {
        return Err(MdataError::UnsupportedVersion(version));
    }
    let flags = buf.get_u64();
    let mut get_ts = || Timespec::new(buf.get_i64(), buf.get_i64());
    let ctime = get_ts();
    let mtime = get_ts();
    let atime = get_ts();

    Ok(MdataRecord {
        version,
        flags,
        ctime,
        mtime,
        atime,
    })
}
