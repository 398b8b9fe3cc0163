//! User interface rendering and input handling.
//!
//! This module provides all UI-related functionality:
//!
//! - **widget**: The hosted terminal screen and host surface lifecycle
//! - **keymap**: Keyboard, paste and mouse input to pty byte sequences
//! - **dialog**: Close confirmation overlay

pub mod dialog;
pub mod keymap;
pub mod widget;

pub use keymap::{InputModes, KeyMapper};
pub use widget::TermWidget;
