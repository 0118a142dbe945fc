/// Remote service module
///
/// This module handles:
/// - Gemini inference requests (gemini.rs)
/// - Firebase anonymous and admin sign-in (auth.rs)
/// - The shared system config document and its live listener (config_store.rs)

pub mod auth;
pub mod config_store;
pub mod gemini;
