//! UI rendering module for the practice screen
//!
//! Rendering uses ratatui; all state lives in `App`.

pub mod help_overlay;
pub mod practice;

pub use help_overlay::render as render_help_overlay;
pub use practice::render as render_practice;
