/// State management module
///
/// This module handles all application state, including:
/// - Shared data structures (data.rs)
/// - The per-tab upload/submit/result controller (tab.rs)

pub mod data;
pub mod tab;
