/// Preview copies of uploaded images
///
/// Each upload gets its own file in the preview cache so the UI can show it
/// independently of the original. The file lives exactly as long as its
/// `PreviewHandle`: dropping the handle deletes the file, once.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::data::SelectedFile;

/// Directory that owns all preview files
#[derive(Debug)]
pub struct PreviewCache {
    dir: PathBuf,
}

impl PreviewCache {
    /// Open (and create if needed) the preview directory.
    ///
    /// Leftover files from an earlier run are removed; no handle can
    /// refer to them anymore.
    pub fn open(dir: PathBuf) -> Result<Self, AppError> {
        fs::create_dir_all(&dir).map_err(|source| AppError::PreviewCache {
            path: dir.clone(),
            source,
        })?;

        let mut stale = 0usize;
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_file() && fs::remove_file(&path).is_ok() {
                    stale += 1;
                }
            }
        }
        if stale > 0 {
            debug!(count = stale, "removed stale previews");
        }

        debug!(dir = %dir.display(), "preview cache ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a preview copy of `file` and return the handle that owns it.
    pub fn create(&self, file: &SelectedFile) -> std::io::Result<PreviewHandle> {
        let ext = extension_for(&file.mime_type);
        let path = self.dir.join(format!("{}.{}", Uuid::new_v4(), ext));
        fs::write(&path, file.bytes.as_slice())?;
        debug!(preview = %path.display(), source = %file.name, "preview created");
        Ok(PreviewHandle { path })
    }
}

/// Owned preview file. Released on drop.
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    path: PathBuf,
}

impl PreviewHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(preview = %self.path.display(), "preview released"),
            Err(e) => warn!(preview = %self.path.display(), error = %e, "failed to release preview"),
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}
