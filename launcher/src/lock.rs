use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Advisory lock on `<runtime>/<app id>.lock`, held for the life of the
/// instance that owns the slot. The kernel drops it when the process dies,
/// so a crashed instance never leaves a stale lock behind.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// `Ok(None)` when another process holds the lock.
    pub fn try_acquire(path: &Path) -> anyhow::Result<Option<InstanceLock>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create runtime dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open lock {}", path.display()))?;

        if !lock_exclusive(&file, path)? {
            return Ok(None);
        }

        log::debug!("lock: acquired {}", path.display());
        Ok(Some(InstanceLock {
            path: path.to_path_buf(),
            _file: file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File, path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // EWOULDBLOCK means another instance holds the lock.
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        return Err(err).with_context(|| format!("flock {}", path.display()));
    }
    Ok(true)
}

// No advisory locking here: every launch owns the slot and detection never runs.
#[cfg(not(unix))]
fn lock_exclusive(_file: &File, _path: &Path) -> anyhow::Result<bool> {
    Ok(true)
}
