/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the service layer and the UI layer.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// MIME types accepted for upload
pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Remote feature flag mirrored from the shared config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Whether AI submissions are allowed
    pub api_enabled: bool,
    /// When an admin last changed the flag (RFC 3339)
    pub last_updated: Option<String>,
    /// Email of the admin who last changed the flag
    pub updated_by: Option<String>,
}

impl Default for SystemConfig {
    /// Enabled until the remote document says otherwise
    fn default() -> Self {
        Self {
            api_enabled: true,
            last_updated: None,
            updated_by: None,
        }
    }
}

/// One generated pose prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosePrompt {
    /// Short title, e.g. "Candid: The Walk"
    pub title: String,
    /// Full image generation prompt
    pub prompt: String,
}

/// A file the user picked or dropped, fully read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// File name only (e.g., "reception.jpg")
    pub name: String,
    /// Detected MIME type, empty if unknown
    pub mime_type: String,
    /// Raw file contents
    pub bytes: Arc<Vec<u8>>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::new(bytes),
        }
    }

    /// Base64 payload for the inference request
    pub fn to_inline(&self) -> InlineImage {
        InlineImage {
            data: base64::engine::general_purpose::STANDARD.encode(self.bytes.as_slice()),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Image bytes encoded for an inline request part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Standard base64, no `data:` prefix
    pub data: String,
    pub mime_type: String,
}

/// Dismissible message modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Blocking progress modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loading {
    pub title: String,
    pub message: String,
}

/// Which tab is showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActiveTab {
    #[default]
    Analyzer,
    Poses,
}
