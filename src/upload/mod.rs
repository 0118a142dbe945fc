/// Upload handling module
///
/// This module handles:
/// - Reading picked or dropped files and detecting their MIME type
/// - Keeping preview copies that are released when replaced or removed

pub mod loader;
pub mod preview;

pub use preview::{PreviewCache, PreviewHandle};
