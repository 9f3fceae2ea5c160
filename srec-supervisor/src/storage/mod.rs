//! Destination resolver: decides where each cycle's file goes.
//!
//! Preferred (external) storage is probed once at startup and its verdict
//! holds for the whole run; later write failures are handled by the retry
//! policy, not by re-probing. Fallback storage is created at startup and
//! assumed usable from then on.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::Result;
use crate::utils::fs::{ensure_dir_all_sync_with_op, same_location};

/// Why preferred storage was found unusable.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("no preferred storage configured")]
    NotConfigured,

    #[error("parent directory {} is not present", .0.display())]
    MissingParent(PathBuf),

    #[error("cannot create {}: {source}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not writable: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is the fallback directory", .0.display())]
    SameAsFallback(PathBuf),
}

/// A storage location and whether it may be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOption {
    pub path: PathBuf,
    pub writable: bool,
}

/// Primary and fallback file paths for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    /// `None` when preferred storage is unavailable for this run.
    pub primary: Option<PathBuf>,
    pub fallback: PathBuf,
}

/// Storage decisions made at startup.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    preferred: Option<StorageOption>,
    fallback: PathBuf,
}

impl StorageLayout {
    /// Build a layout from already-made decisions.
    pub fn new(preferred: Option<StorageOption>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            preferred,
            fallback: fallback.into(),
        }
    }

    /// Create the fallback directory and probe preferred storage.
    ///
    /// Failing to create the fallback directory is the only error: without it
    /// no capture is possible.
    pub fn prepare(preferred: Option<&Path>, fallback: &Path) -> Result<Self> {
        ensure_dir_all_sync_with_op("creating fallback directory", fallback)?;

        let preferred = match preferred {
            None => {
                info!("{}; using fallback only", ProbeFailure::NotConfigured);
                None
            }
            Some(path) => {
                let writable = match probe(path, fallback) {
                    Ok(()) => {
                        info!("External storage OK: {}", path.display());
                        true
                    }
                    Err(reason) => {
                        warn!(
                            "External storage unavailable ({}); recording to fallback {}",
                            reason,
                            fallback.display()
                        );
                        false
                    }
                };
                Some(StorageOption {
                    path: path.to_path_buf(),
                    writable,
                })
            }
        };

        Ok(Self::new(preferred, fallback))
    }

    pub fn preferred(&self) -> Option<&StorageOption> {
        self.preferred.as_ref()
    }

    pub fn preferred_available(&self) -> bool {
        self.preferred.as_ref().is_some_and(|p| p.writable)
    }

    pub fn fallback_dir(&self) -> &Path {
        &self.fallback
    }

    /// Full paths for `filename` on both storages.
    pub fn destinations(&self, filename: &str) -> Destinations {
        Destinations {
            primary: self
                .preferred
                .as_ref()
                .filter(|p| p.writable)
                .map(|p| p.path.join(filename)),
            fallback: self.fallback.join(filename),
        }
    }
}

/// Check that `path` can hold captures.
///
/// The parent must already exist (an unmounted drive leaves only the mount
/// point's parent behind), `path` itself is created if needed and a
/// throwaway file is written to prove writability.
pub fn probe(path: &Path, fallback: &Path) -> std::result::Result<(), ProbeFailure> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {}
        Some(parent) => return Err(ProbeFailure::MissingParent(parent.to_path_buf())),
        None => return Err(ProbeFailure::MissingParent(path.to_path_buf())),
    }

    std::fs::create_dir_all(path).map_err(|source| ProbeFailure::CreateFailed {
        path: path.to_path_buf(),
        source,
    })?;

    tempfile::Builder::new()
        .prefix(".srec-probe-")
        .tempfile_in(path)
        .map_err(|source| ProbeFailure::NotWritable {
            path: path.to_path_buf(),
            source,
        })?;

    if same_location(path, fallback) {
        return Err(ProbeFailure::SameAsFallback(path.to_path_buf()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_with_writable_preferred() {
        let temp = TempDir::new().unwrap();
        let preferred = temp.path().join("Videos").join("Twitch");
        std::fs::create_dir(temp.path().join("Videos")).unwrap();
        let fallback = temp.path().join("twitch");

        let layout = StorageLayout::prepare(Some(&preferred), &fallback).unwrap();

        assert!(layout.preferred_available());
        assert!(preferred.is_dir());
        assert!(fallback.is_dir());
        // the probe file does not linger
        assert_eq!(std::fs::read_dir(&preferred).unwrap().count(), 0);

        let dest = layout.destinations("alice-20240102-030405.mp4");
        assert_eq!(dest.primary, Some(preferred.join("alice-20240102-030405.mp4")));
        assert_eq!(dest.fallback, fallback.join("alice-20240102-030405.mp4"));
    }

    #[test]
    fn test_missing_parent_marks_unavailable() {
        let temp = TempDir::new().unwrap();
        let preferred = temp.path().join("unmounted").join("Twitch");
        let fallback = temp.path().join("twitch");

        let layout = StorageLayout::prepare(Some(&preferred), &fallback).unwrap();

        assert!(!layout.preferred_available());
        assert!(!preferred.exists());
        assert_eq!(layout.destinations("f.mp4").primary, None);
        assert!(matches!(
            probe(&preferred, &fallback),
            Err(ProbeFailure::MissingParent(_))
        ));
    }

    #[test]
    fn test_target_blocked_by_file_is_create_failure() {
        let temp = TempDir::new().unwrap();
        let preferred = temp.path().join("Twitch");
        std::fs::write(&preferred, "not a directory").unwrap();
        let fallback = temp.path().join("twitch-local");

        assert!(matches!(
            probe(&preferred, &fallback),
            Err(ProbeFailure::CreateFailed { .. })
        ));
        let layout = StorageLayout::prepare(Some(&preferred), &fallback).unwrap();
        assert!(!layout.preferred_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let preferred = temp.path().join("Twitch");
        std::fs::create_dir(&preferred).unwrap();
        std::fs::set_permissions(&preferred, std::fs::Permissions::from_mode(0o555)).unwrap();

        // privileged users bypass mode bits; nothing to check then
        if tempfile::tempfile_in(&preferred).is_ok() {
            return;
        }

        let result = probe(&preferred, &temp.path().join("twitch"));
        std::fs::set_permissions(&preferred, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(ProbeFailure::NotWritable { .. })));
    }

    #[test]
    fn test_same_as_fallback_is_rejected() {
        let temp = TempDir::new().unwrap();
        let fallback = temp.path().join("twitch");
        std::fs::create_dir(&fallback).unwrap();

        let layout = StorageLayout::prepare(Some(&fallback), &fallback).unwrap();
        assert!(!layout.preferred_available());
    }

    #[test]
    fn test_no_preferred_configured() {
        let temp = TempDir::new().unwrap();
        let fallback = temp.path().join("kick");
        let layout = StorageLayout::prepare(None, &fallback).unwrap();
        assert!(layout.preferred().is_none());
        assert!(!layout.preferred_available());
        assert!(fallback.is_dir());
    }

    #[test]
    fn test_fallback_creation_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = StorageLayout::prepare(None, &blocker.join("twitch"));
        assert!(matches!(result, Err(crate::Error::IoPath { .. })));
    }
}
