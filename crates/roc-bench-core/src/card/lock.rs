//! Exclusive channel ownership via advisory file locks.

use super::CardId;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Held for as long as the channel is open. Released when dropped.
#[derive(Debug)]
pub struct ChannelLock {
    _file: File,
    path: PathBuf,
}

impl ChannelLock {
    /// Lock file name for a card/channel pair.
    pub fn file_name(card_id: &CardId, channel: u32) -> String {
        format!("roc-dma-bench_id={card_id}_chan={channel}.lock")
    }

    /// Take the lock without blocking.
    pub fn acquire(dir: &Path, card_id: &CardId, channel: u32) -> Result<Self> {
        let path = dir.join(Self::file_name(card_id, channel));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::buffer(format!("failed to open lock file {}", path.display()), e))?;

        // SAFETY: fd is owned by `file`
        let rc = unsafe { nix::libc::flock(file.as_raw_fd(), nix::libc::LOCK_EX | nix::libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(Error::Capability(format!(
                    "channel {channel} of card {card_id} is already in use"
                )));
            }
            return Err(Error::Io(err));
        }

        tracing::debug!(path = %path.display(), "acquired channel lock");
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
