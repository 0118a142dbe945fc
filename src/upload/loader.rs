/// Loads picked or dropped files into memory
///
/// The MIME type comes from the file extension, like a browser's `File.type`.
/// Files without a recognised extension fall back to sniffing the header.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::state::data::SelectedFile;

/// Read a file from disk for upload
pub async fn load_selected_file(path: PathBuf) -> Result<SelectedFile, ValidationError> {
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "failed to read upload");
        ValidationError::Unreadable {
            reason: e.to_string(),
        }
    })?;

    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let mime_type = detect_mime_type(&path, &bytes);

    debug!(file = %name, mime = %mime_type, size = bytes.len(), "upload loaded");
    Ok(SelectedFile::new(name, mime_type, bytes))
}

/// MIME type for a file, or an empty string when it is not an image format
/// the `image` crate knows.
pub fn detect_mime_type(path: &Path, bytes: &[u8]) -> String {
    image::ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(bytes))
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_default()
}

/// File extensions offered in the picker dialog
pub const PICKER_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
