/// Error types for every user-facing action in the app.
///
/// Each enum belongs to one boundary (upload, submit, inference, login,
/// config write). Errors that travel through iced messages are `Clone`,
/// so transport causes are kept as strings.

use std::path::PathBuf;

/// Upload or submit rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// File type outside jpeg/png/webp.
    #[error("unsupported image type: {mime_type:?}")]
    UnsupportedMimeType { mime_type: String },

    /// Submit pressed with no uploaded image.
    #[error("no image uploaded")]
    MissingImage,

    /// The file could not be read or its preview could not be written.
    #[error("image could not be read: {reason}")]
    Unreadable { reason: String },
}

/// The AI feature is switched off by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("AI service is disabled for maintenance")]
pub struct MaintenanceError;

/// Why a single inference call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceFailure {
    /// Connection or body read failure.
    Transport(String),
    /// Non-2xx status from the endpoint.
    Status { status: u16, detail: String },
    /// The model returned no text.
    EmptyResponse,
    /// The text did not match the expected JSON shape.
    Malformed(String),
}

impl std::fmt::Display for InferenceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Status { status, detail } => write!(f, "HTTP {status}: {detail}"),
            Self::EmptyResponse => write!(f, "empty response from model"),
            Self::Malformed(e) => write!(f, "malformed response: {e}"),
        }
    }
}

/// A failed call to the inference endpoint.
///
/// The display text is what the user may see; the cause is for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("AI analysis failed. Please try again.")]
    Analysis(InferenceFailure),

    #[error("AI pose generation failed. Please try again.")]
    PoseGeneration(InferenceFailure),
}

impl InferenceError {
    /// The underlying cause.
    pub fn failure(&self) -> &InferenceFailure {
        match self {
            Self::Analysis(f) | Self::PoseGeneration(f) => f,
        }
    }
}

/// Why `submit` did not start a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A request for this tab is already in flight.
    #[error("a request is already in flight")]
    Busy,
}

/// Sign-in failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,

    #[error("invalid email or password")]
    InvalidCredentials,

    /// The sign-in method is not enabled for the project.
    #[error("sign-in provider disabled: {0}")]
    ProviderDisabled(String),

    #[error("identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}

impl AuthError {
    /// Localized message for the login form.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => crate::locale::LOGIN_MISSING_FIELDS,
            _ => crate::locale::LOGIN_FAILED,
        }
    }
}

/// Admin toggle write failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigWriteError {
    /// Caller is not an admin. Raised locally, nothing is sent.
    #[error("only an admin can change the system config")]
    PermissionDenied,

    #[error("config write rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("config write failed: {0}")]
    Transport(String),
}

/// Config listener failures. Logged, never shown to users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigReadError {
    /// The server refused or dropped the listen target, e.g. a rules
    /// denial. `code` is the gRPC status name.
    #[error("config listen rejected ({code}): {detail}")]
    Rejected { code: String, detail: String },

    #[error("config listen transport error: {0}")]
    Transport(String),

    #[error("config listen frame could not be decoded: {0}")]
    Decode(String),
}

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to prepare preview cache {path}: {source}")]
    PreviewCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("UI error: {0}")]
    Ui(#[from] iced::Error),
}
