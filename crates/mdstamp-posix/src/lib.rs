//! mdstamp Posix - Consistent timestamps for brick files
//!
//! This crate keeps a per-file ctime/mtime/atime record in an extended
//! attribute so that replicas of the same file report identical times:
//! - On-disk record codec (fixed 57-byte big-endian layout)
//! - Extended attribute access by fd or path
//! - GFID handle path resolution
//! - Per-inode record cache and lock
//! - Monotonic merge and synchronous persistence

pub mod codec;
pub mod handle;
pub mod inode;
pub mod metadata;
pub mod store;
pub mod xattr;

#[cfg(test)]
mod testing;

// Re-exports
pub use codec::{MDATA_DISK_SIZE, decode, encode};
pub use handle::{HANDLE_DIR, HandleDir, HandleResolver, NoHandles};
pub use inode::Inode;
pub use metadata::{Bootstrap, PosixMdata, StatBootstrap};
pub use store::{FileRef, MdataXattrStore, unsupported_warnings};
pub use xattr::{SysXattr, XattrBackend, XattrTarget};
