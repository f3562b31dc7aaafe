//! GFID handle path resolution
//!
//! Every file on a brick is hard-linked under the brick's handle directory
//! by GFID:
//!
//! ```text
//! <brick>/.glusterfs/c4/a5/c4a5f1de-7c3b-4a47-9f58-7f6b9b0a1e22
//! ```
//!
//! The metadata layer only needs "GFID in, usable path or nothing out".

use mdstamp_common::Gfid;
use std::path::{Path, PathBuf};

/// Name of the handle directory at the brick root
pub const HANDLE_DIR: &str = ".glusterfs";

/// Turns a durable identity into a local path
pub trait HandleResolver: Send + Sync {
    fn resolve(&self, gfid: &Gfid) -> Option<PathBuf>;
}

/// Resolver over a brick's `.glusterfs` handle tree
#[derive(Debug, Clone)]
pub struct HandleDir {
    brick: PathBuf,
}

impl HandleDir {
    pub fn new(brick: impl AsRef<Path>) -> Self {
        Self {
            brick: brick.as_ref().to_path_buf(),
        }
    }

    /// Handle path for `gfid`, whether or not it exists
    pub fn handle_path(&self, gfid: &Gfid) -> PathBuf {
        let hex = gfid.to_string();
        self.brick
            .join(HANDLE_DIR)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }
}

impl HandleResolver for HandleDir {
    fn resolve(&self, gfid: &Gfid) -> Option<PathBuf> {
        if gfid.is_nil() {
            return None;
        }
        let path = self.handle_path(gfid);
        // lstat: the handle of a directory is a symlink and must not be followed
        std::fs::symlink_metadata(&path).ok().map(|_| path)
    }
}

/// Resolver for callers that always pass a path or fd
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandles;

impl HandleResolver for NoHandles {
    fn resolve(&self, _gfid: &Gfid) -> Option<PathBuf> {
        None
    }
}
