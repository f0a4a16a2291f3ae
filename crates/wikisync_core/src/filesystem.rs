use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::marker::SyncMarker;

pub const BODY_FILENAME: &str = "index.md";
pub const MARKER_FILENAME: &str = "memo.md";

/// Local side of a sync run. Every call is blocking and returns a typed
/// per-item failure; the reconciler decides what a failure means for the run.
pub trait LocalStore {
    fn create_dir_all(&mut self, path: &Path) -> Result<(), SyncError>;
    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), SyncError>;
    fn read_to_string(&self, path: &Path) -> Result<String, SyncError>;
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, SyncError>;
    /// File names (not paths) of regular files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> Result<Vec<String>, SyncError>;
    fn file_exists(&self, path: &Path) -> bool;
    fn dir_exists(&self, path: &Path) -> bool;
    /// Folders under `root` (root included) that directly hold a body or a
    /// marker document, in file-name order.
    fn page_folders(&self, root: &Path) -> Result<Vec<PathBuf>, SyncError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStore;

impl LocalStore for DiskStore {
    fn create_dir_all(&mut self, path: &Path) -> Result<(), SyncError> {
        fs::create_dir_all(path).map_err(|error| SyncError::filesystem(path, error))
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        fs::write(path, bytes).map_err(|error| SyncError::filesystem(path, error))
    }

    fn read_to_string(&self, path: &Path) -> Result<String, SyncError> {
        fs::read_to_string(path).map_err(|error| SyncError::filesystem(path, error))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        fs::read(path).map_err(|error| SyncError::filesystem(path, error))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, SyncError> {
        let entries = fs::read_dir(dir).map_err(|error| SyncError::filesystem(dir, error))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| SyncError::filesystem(dir, error))?;
            if entry.file_type().is_ok_and(|kind| kind.is_file()) {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn page_folders(&self, root: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let mut folders = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                let path = error.path().unwrap_or(root).to_path_buf();
                SyncError::filesystem(&path, io::Error::from(error))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let folder = entry.path();
            if folder.join(BODY_FILENAME).is_file() || folder.join(MARKER_FILENAME).is_file() {
                folders.push(folder.to_path_buf());
            }
        }
        Ok(folders)
    }
}

/// A page folder whose marker resolved.
#[derive(Debug, Clone)]
pub struct MarkedPage {
    pub folder: PathBuf,
    pub marker: SyncMarker,
}

#[derive(Debug, Clone, Default)]
pub struct MarkerScan {
    pub pages: Vec<MarkedPage>,
    /// Marker paths that could not be resolved, with the reason.
    pub unresolved: Vec<(PathBuf, String)>,
}

/// Resolve the marker of every page folder under `root`, sorted by original
/// page name. A folder whose marker is missing, unreadable or malformed lands
/// in `unresolved` instead of failing the scan.
pub fn scan_markers<S>(store: &S, root: &Path) -> Result<MarkerScan, SyncError>
where
    S: LocalStore + ?Sized,
{
    let mut scan = MarkerScan::default();
    for folder in store.page_folders(root)? {
        let path = folder.join(MARKER_FILENAME);
        let parsed = if store.file_exists(&path) {
            store
                .read_to_string(&path)
                .and_then(|content| SyncMarker::parse(&content, &path))
        } else {
            Err(SyncError::marker(&path, "marker file missing"))
        };
        match parsed {
            Ok(marker) => scan.pages.push(MarkedPage { folder, marker }),
            Err(error) => {
                warn!("skipping {}: {error}", display_path(&folder));
                scan.unresolved.push((path, error.to_string()));
            }
        }
    }
    scan.pages
        .sort_by(|left, right| left.marker.page_name.cmp(&right.marker.page_name));
    Ok(scan)
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}
