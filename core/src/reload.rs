//! Detection of fresh simulation builds.
//!
//! Each frame the orchestrator polls the on-disk artifact the build
//! system writes. A new modification timestamp with no build-lock marker
//! present means a finished build: the watcher copies the artifact to a
//! private shadow path (so the build system is never blocked by the host
//! holding its output open) and hands the bytes back. The caller performs
//! the actual module swap and calls [`ReloadWatcher::commit`] only once
//! the swap succeeded, so a failed load is retried instead of being
//! recorded as seen.
//!
//! Transient conditions - artifact missing, lock marker present,
//! timestamp unchanged - are silent skips, not errors.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Marker file the build system keeps beside the artifact while a build
/// is in progress. Its presence means the artifact may be half-written.
pub const BUILD_LOCK_FILE: &str = "lock.tmp";

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to copy module artifact {path} to its shadow path")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read shadow module artifact {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of one reload poll.
pub enum ReloadCheck {
    /// Nothing to do this frame.
    Unchanged,
    /// A finished new build was found; `bytes` are its contents. Call
    /// [`ReloadWatcher::commit`] with `mtime` after a successful swap.
    Changed {
        bytes: Vec<u8>,
        mtime: SystemTime,
    },
}

/// Watches the simulation module artifact for finished rebuilds.
pub struct ReloadWatcher {
    artifact: PathBuf,
    shadow: PathBuf,
    lock: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl ReloadWatcher {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        let artifact: PathBuf = artifact.into();
        let shadow = shadow_path(&artifact);
        let lock = artifact
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(BUILD_LOCK_FILE);
        Self {
            artifact,
            shadow,
            lock,
            last_mtime: None,
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    pub fn shadow_path(&self) -> &Path {
        &self.shadow
    }

    /// Check whether a finished new build is available.
    pub fn poll(&mut self) -> Result<ReloadCheck, ReloadError> {
        let Ok(metadata) = std::fs::metadata(&self.artifact) else {
            // Not built yet, or mid-rename. Retry next frame.
            return Ok(ReloadCheck::Unchanged);
        };
        let Ok(mtime) = metadata.modified() else {
            return Ok(ReloadCheck::Unchanged);
        };

        if self.lock.exists() {
            tracing::trace!(lock = %self.lock.display(), "build in progress, skipping reload");
            return Ok(ReloadCheck::Unchanged);
        }
        if self.last_mtime == Some(mtime) {
            return Ok(ReloadCheck::Unchanged);
        }

        // Load from a copy so the path the build system writes stays free
        // for the next recompile.
        std::fs::copy(&self.artifact, &self.shadow).map_err(|source| ReloadError::Copy {
            path: self.artifact.clone(),
            source,
        })?;
        let bytes = std::fs::read(&self.shadow).map_err(|source| ReloadError::Read {
            path: self.shadow.clone(),
            source,
        })?;

        tracing::info!(
            artifact = %self.artifact.display(),
            bytes = bytes.len(),
            "new simulation build detected"
        );
        Ok(ReloadCheck::Changed { bytes, mtime })
    }

    /// Record a timestamp as successfully loaded. Until this is called
    /// the same build will be offered again on the next poll.
    pub fn commit(&mut self, mtime: SystemTime) {
        self.last_mtime = Some(mtime);
    }
}

fn shadow_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".hot");
    if let Some(ext) = artifact.extension() {
        name.push(".");
        name.push(ext);
    }
    artifact.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    use super::{BUILD_LOCK_FILE, ReloadCheck, ReloadWatcher};

    fn bump_mtime(path: &std::path::Path) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(2))
            .unwrap();
    }

    #[test]
    fn missing_artifact_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = ReloadWatcher::new(dir.path().join("sim.wasm"));
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));
    }

    #[test]
    fn fresh_artifact_is_offered_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("sim.wasm");
        std::fs::write(&artifact, b"v1").unwrap();

        let mut watcher = ReloadWatcher::new(&artifact);
        let ReloadCheck::Changed { bytes, mtime } = watcher.poll().unwrap() else {
            panic!("expected a change on first sight of the artifact");
        };
        assert_eq!(bytes, b"v1");

        // Not committed: the same build is offered again (failed swap retry).
        assert!(matches!(
            watcher.poll().unwrap(),
            ReloadCheck::Changed { .. }
        ));

        watcher.commit(mtime);
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));
    }

    #[test]
    fn build_lock_gates_reload_regardless_of_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("sim.wasm");
        std::fs::write(&artifact, b"v1").unwrap();
        let lock = dir.path().join(BUILD_LOCK_FILE);
        std::fs::write(&lock, b"").unwrap();

        let mut watcher = ReloadWatcher::new(&artifact);
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));
        bump_mtime(&artifact);
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));

        // Removing the marker with a changed timestamp triggers exactly
        // one swap.
        std::fs::remove_file(&lock).unwrap();
        let ReloadCheck::Changed { mtime, .. } = watcher.poll().unwrap() else {
            panic!("expected the gated build to be offered");
        };
        watcher.commit(mtime);
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));
    }

    #[test]
    fn rebuilt_artifact_triggers_one_more_swap() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("sim.wasm");
        std::fs::write(&artifact, b"v1").unwrap();

        let mut watcher = ReloadWatcher::new(&artifact);
        let ReloadCheck::Changed { mtime, .. } = watcher.poll().unwrap() else {
            panic!("expected initial build");
        };
        watcher.commit(mtime);

        std::fs::write(&artifact, b"v2").unwrap();
        bump_mtime(&artifact);
        let ReloadCheck::Changed { bytes, mtime } = watcher.poll().unwrap() else {
            panic!("expected rebuilt artifact");
        };
        assert_eq!(bytes, b"v2");
        watcher.commit(mtime);
        assert!(matches!(watcher.poll().unwrap(), ReloadCheck::Unchanged));
    }

    #[test]
    fn loads_from_a_private_copy() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("sim.wasm");
        std::fs::write(&artifact, b"v1").unwrap();

        let mut watcher = ReloadWatcher::new(&artifact);
        watcher.poll().unwrap();
        assert_eq!(watcher.shadow_path(), dir.path().join("sim.hot.wasm"));
        assert_eq!(std::fs::read(watcher.shadow_path()).unwrap(), b"v1");
        // The original is untouched and free for the build system.
        assert_eq!(std::fs::read(&artifact).unwrap(), b"v1");
    }
}
