/// User interface module
///
/// This module handles:
/// - Alert and loading modals (modal.rs)
/// - The analyzer and pose tab pages (tab_view.rs)
/// - The admin settings panel (settings.rs)

pub mod modal;
pub mod settings;
pub mod tab_view;
