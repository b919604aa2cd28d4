//! PID file lifecycle.
//!
//! The daemon claims `/tmp/pytouchd.pid` on startup and removes it on every
//! exit path; deleting the file externally asks the running daemon to stop.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process;

/// Default PID file location.
pub const DEFAULT_PATH: &str = "/tmp/pytouchd.pid";

/// World-writable so an unprivileged session can ask the daemon to stop by
/// deleting the file.
const PID_FILE_MODE: u32 = 0o666;

/// An error produced while claiming or reading the PID file.
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("daemon already running with pid {0}")]
    AlreadyRunning(u32),

    #[error("could not create PID file: {0}")]
    Create(#[source] io::Error),

    #[error("could not read PID file: {0}")]
    Read(#[source] io::Error),

    #[error("PID file does not contain a decimal pid")]
    Malformed,
}

/// Read the recorded pid, if the file exists.
pub fn read(path: &Path) -> Result<Option<u32>, PidFileError> {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().parse().map(Some).map_err(|_| PidFileError::Malformed),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PidFileError::Read(err)),
    }
}

/// Whether a process with this pid exists.
pub fn alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// The claimed PID file; removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for this process. A live daemon already holding it is an
    /// error; a stale file from a dead process is replaced.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PidFileError> {
        let path = path.into();
        if let Some(pid) = read(&path)? {
            if alive(pid) {
                return Err(PidFileError::AlreadyRunning(pid));
            }
            log::info!("removing stale PID file of dead pid {pid}");
            fs::remove_file(&path).map_err(PidFileError::Create)?;
        }
        fs::write(&path, process::id().to_string()).map_err(PidFileError::Create)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(PID_FILE_MODE))
            .map_err(PidFileError::Create)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is still present; its deletion is a stop request.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("could not remove PID file {}: {err}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("touchd-test-{tag}-{}.pid", process::id()))
    }

    #[test]
    fn claims_and_removes_on_drop() {
        let path = temp_path("claim");
        let pidfile = PidFile::create(&path).unwrap();
        assert!(pidfile.exists());
        assert_eq!(read(&path).unwrap(), Some(process::id()));
        drop(pidfile);
        assert!(!path.exists());
    }

    #[test]
    fn rejects_a_live_daemon() {
        let path = temp_path("live");
        // Our own pid is alive by definition.
        let _held = PidFile::create(&path).unwrap();
        assert!(matches!(PidFile::create(&path), Err(PidFileError::AlreadyRunning(_))));
    }

    #[test]
    fn replaces_a_stale_file() {
        let path = temp_path("stale");
        // A pid from far outside the default pid_max range.
        fs::write(&path, "4194304999").unwrap();
        let pidfile = PidFile::create(&path).unwrap();
        assert_eq!(read(&path).unwrap(), Some(process::id()));
        drop(pidfile);
    }

    #[test]
    fn missing_file_reads_as_none() {
        assert_eq!(read(Path::new("/nonexistent/touchd.pid")).unwrap(), None);
    }

    #[test]
    fn own_process_is_alive() {
        assert!(alive(process::id()));
        assert!(!alive(4194304999));
    }
}
