//! File-based locking using `flock(2)` directly.
//!
//! Guards whole-file rewrites of engine state so that two processes sharing a
//! data directory cannot interleave their writes. Uses raw `libc::flock`
//! instead of an RAII wrapper so the guard only needs to own the `File`;
//! `Drop` calls `flock(fd, LOCK_UN)`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use revo_core::AppError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Diagnostic information written to lock files
#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    name: String,
    acquired_at: DateTime<Utc>,
    reason: String,
}

/// Exclusive advisory lock backed by `flock(2)`.
pub struct FileLock {
    /// Closing the file also releases the flock; `Drop` unlocks explicitly
    /// for deterministic release timing.
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // If unlocking fails the lock is still released when the fd closes.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl FileLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Outcome of a single non-blocking attempt.
enum Attempt {
    Acquired(FileLock),
    Held,
}

/// Acquire a non-blocking exclusive lock named `name` under `dir`.
///
/// Lock path: `{dir}/locks/{name}.lock`. On success the holder's PID, name,
/// timestamp and reason are written into the lock file. On failure the
/// error reports the holder read back from that diagnostic.
pub fn acquire_lock(dir: &Path, name: &str, reason: &str) -> Result<FileLock> {
    let lock_path = lock_path_for(dir, name)?;
    match try_lock(&lock_path, name, reason)? {
        Attempt::Acquired(lock) => Ok(lock),
        Attempt::Held => Err(held_error(&lock_path)),
    }
}

/// Like [`acquire_lock`], but keeps retrying until `timeout` elapses.
pub fn acquire_lock_with_timeout(
    dir: &Path,
    name: &str,
    reason: &str,
    timeout: Duration,
) -> Result<FileLock> {
    let lock_path = lock_path_for(dir, name)?;
    let deadline = Instant::now() + timeout;
    loop {
        if let Attempt::Acquired(lock) = try_lock(&lock_path, name, reason)? {
            return Ok(lock);
        }
        if Instant::now() >= deadline {
            return Err(held_error(&lock_path));
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}

fn lock_path_for(dir: &Path, name: &str) -> Result<PathBuf> {
    let locks_dir = dir.join("locks");
    fs::create_dir_all(&locks_dir)
        .with_context(|| format!("Failed to create locks directory: {}", locks_dir.display()))?;
    Ok(locks_dir.join(format!("{name}.lock")))
}

fn try_lock(lock_path: &Path, name: &str, reason: &str) -> Result<Attempt> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    let fd = file.as_raw_fd();

    // SAFETY: `fd` is a valid file descriptor from the `File` we just opened.
    // `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        return Ok(Attempt::Held);
    }

    let mut lock = FileLock {
        file,
        lock_path: lock_path.to_path_buf(),
    };

    let diagnostic = LockDiagnostic {
        pid: std::process::id(),
        name: name.to_string(),
        acquired_at: Utc::now(),
        reason: reason.to_string(),
    };
    let json = serde_json::to_string(&diagnostic).context("Failed to serialize lock diagnostic")?;

    lock.file
        .set_len(0)
        .context("Failed to truncate lock file")?;
    lock.file
        .write_all(json.as_bytes())
        .context("Failed to write lock diagnostic")?;
    lock.file.flush().context("Failed to flush lock file")?;

    tracing::trace!(path = %lock_path.display(), reason, "acquired file lock");
    Ok(Attempt::Acquired(lock))
}

fn held_error(lock_path: &Path) -> anyhow::Error {
    let mut contents = String::new();
    let read = File::open(lock_path).and_then(|mut file| file.read_to_string(&mut contents));
    if read.is_err() {
        return anyhow::anyhow!("{} is locked (unable to read diagnostic info)", lock_path.display());
    }

    match serde_json::from_str::<LockDiagnostic>(&contents) {
        Ok(diagnostic) => anyhow::Error::new(AppError::MemoryLocked(diagnostic.pid)).context(
            format!(
                "{} held by {} (reason: {}, acquired: {})",
                lock_path.display(),
                diagnostic.name,
                diagnostic.reason,
                diagnostic.acquired_at
            ),
        ),
        Err(_) => anyhow::anyhow!("{} is locked (unable to read diagnostic info)", lock_path.display()),
    }
}
