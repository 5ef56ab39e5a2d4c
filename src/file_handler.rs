use crate::RegroupError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const ARCHIVE_EXTENSION: &str = "arc";
pub const CACHE_EXTENSION: &str = "ids";
const DEFAULT_STATE_DIR: &str = "./regroup_state";

/// Resolves archive references (paths relative to a root) into full paths
/// for each of the three roots, and discovers the input archives.
pub trait PreprocessingIo: Send + Sync {
    fn find_relative_archive_paths(&self) -> Result<BTreeSet<PathBuf>, RegroupError>;
    fn full_path_in(&self, rel: &Path) -> PathBuf;
    fn full_path_merged(&self, rel: &Path) -> PathBuf;
    fn full_path_out(&self, rel: &Path) -> PathBuf;
}

/// Configuration for the input, merged and final directories
#[derive(Debug, Clone)]
pub struct IoConfig {
    pub dir_in: PathBuf,
    pub dir_merged: PathBuf,
    pub dir_out: PathBuf,
    pub extension: String,
}

impl IoConfig {
    pub fn new(dir_in: PathBuf, dir_merged: PathBuf, dir_out: PathBuf) -> Self {
        Self {
            dir_in,
            dir_merged,
            dir_out,
            extension: ARCHIVE_EXTENSION.to_string(),
        }
    }

    /// Standard layout below one state directory
    pub fn under(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self::new(
            base_dir.join("input"),
            base_dir.join("merged"),
            base_dir.join("final"),
        )
    }

    /// Layout below `REGROUP_STATE_DIR`, or `./regroup_state` if unset
    pub fn from_env() -> Self {
        let state_dir =
            std::env::var("REGROUP_STATE_DIR").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string());
        Self::under(state_dir)
    }

    /// Creates the merged and final roots. Failing here is fatal for a run.
    pub fn ensure_output_dirs(&self) -> Result<(), RegroupError> {
        ensure_directory_exists(&self.dir_merged)?;
        ensure_directory_exists(&self.dir_out)
    }
}

impl PreprocessingIo for IoConfig {
    fn find_relative_archive_paths(&self) -> Result<BTreeSet<PathBuf>, RegroupError> {
        if !self.dir_in.is_dir() {
            return Err(RegroupError::NotFound(self.dir_in.clone()));
        }
        collect_archives(&self.dir_in, &self.extension)
    }

    fn full_path_in(&self, rel: &Path) -> PathBuf {
        self.dir_in.join(rel)
    }

    fn full_path_merged(&self, rel: &Path) -> PathBuf {
        self.dir_merged.join(rel)
    }

    fn full_path_out(&self, rel: &Path) -> PathBuf {
        self.dir_out.join(rel)
    }
}

/// Walks `root` without following symlinks, so linked directories (and loops
/// through them) never yield the same archive twice.
fn collect_archives(root: &Path, extension: &str) -> Result<BTreeSet<PathBuf>, RegroupError> {
    let mut found = BTreeSet::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            let rel = path
                .strip_prefix(root)
                .map_err(|_| RegroupError::InvalidPath(path.display().to_string()))?;
            found.insert(rel.to_path_buf());
        }
    }
    Ok(found)
}

pub fn ensure_directory_exists(path: &Path) -> Result<(), RegroupError> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Location of the identifier cache kept next to an archive
pub fn cache_path_for(archive: &Path) -> PathBuf {
    archive.with_extension(CACHE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base_dir() {
        let config = IoConfig::under("/tmp/state");
        assert_eq!(config.dir_in, PathBuf::from("/tmp/state/input"));
        assert_eq!(config.dir_merged, PathBuf::from("/tmp/state/merged"));
        assert_eq!(config.dir_out, PathBuf::from("/tmp/state/final"));
        assert_eq!(
            config.full_path_out(Path::new("sub/a.arc")),
            PathBuf::from("/tmp/state/final/sub/a.arc")
        );
    }

    #[test]
    fn test_discovery_is_recursive_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let config = IoConfig::under(dir.path());
        fs::create_dir_all(config.dir_in.join("sub")).unwrap();
        fs::write(config.dir_in.join("a.arc"), b"").unwrap();
        fs::write(config.dir_in.join("sub").join("b.arc"), b"").unwrap();
        fs::write(config.dir_in.join("a.ids"), b"[]").unwrap();
        fs::write(config.dir_in.join("notes.txt"), b"").unwrap();

        let found = config.find_relative_archive_paths().unwrap();

        let expected: BTreeSet<PathBuf> =
            [PathBuf::from("a.arc"), PathBuf::from("sub/b.arc")].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = IoConfig::under(dir.path().join("nothing_here"));
        assert!(matches!(
            config.find_relative_archive_paths(),
            Err(RegroupError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let config = IoConfig::under(dir.path());
        fs::create_dir_all(config.dir_in.join("sub")).unwrap();
        fs::write(config.dir_in.join("a.arc"), b"").unwrap();
        std::os::unix::fs::symlink(&config.dir_in, config.dir_in.join("sub").join("loop")).unwrap();

        let found = config.find_relative_archive_paths().unwrap();

        let expected: BTreeSet<PathBuf> = [PathBuf::from("a.arc")].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_cache_path_shares_base_name() {
        assert_eq!(
            cache_path_for(Path::new("in/sub/a.arc")),
            PathBuf::from("in/sub/a.ids")
        );
    }
}
