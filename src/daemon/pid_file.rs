//! PID file handling and the single-instance guard

use crate::errors::{AppError, AppResult, ErrorContextExt};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whether a process with `pid` currently exists
pub fn is_process_running(pid: u32) -> bool {
    // 0 would address our own process group
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs only the existence and permission check
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Read the pid recorded in `path`, `None` when missing or unparsable
pub fn read_pid(path: &Path) -> AppResult<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::io_with_source(path, "read pid file", e)),
    }
}

/// Pid of the live instance recorded in `path`
///
/// A stale or unparsable file is removed on the way.
pub fn running_pid(path: &Path) -> AppResult<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }

    match read_pid(path)? {
        Some(pid) if pid != std::process::id() && is_process_running(pid) => Ok(Some(pid)),
        stale => {
            debug!("Removing stale PID file {} ({:?})", path.display(), stale);
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove stale PID file: {}", e);
            }
            Ok(None)
        }
    }
}

/// The PID file owned by the running server
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Record the current process in `path`
    ///
    /// Fails with `AlreadyRunning` when the file names another live process.
    pub fn acquire(path: &Path) -> AppResult<Self> {
        if let Some(pid) = running_pid(path)? {
            return Err(AppError::AlreadyRunning { pid });
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).in_file_operation(parent, "create pid file directory")?;
        }

        let pid = std::process::id();
        fs::write(path, format!("{}\n", pid)).in_file_operation(path, "write pid file")?;
        info!("PID {} recorded in {}", pid, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the file unless another process has taken it over since
    pub fn release(self) -> AppResult<()> {
        match read_pid(&self.path)? {
            Some(pid) if pid != self.pid => {
                warn!(
                    "PID file {} now names PID {}, leaving it in place",
                    self.path.display(),
                    pid
                );
                Ok(())
            }
            _ if !self.path.exists() => Ok(()),
            _ => {
                fs::remove_file(&self.path).in_file_operation(&self.path, "remove pid file")?;
                debug!("Removed PID file {}", self.path.display());
                Ok(())
            }
        }
    }
}
