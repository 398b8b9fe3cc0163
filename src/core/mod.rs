//! Session lifecycle core.
//!
//! Everything with real decision logic lives here, free of terminal I/O:
//!
//! - **env**: child environment construction and `SHELL`/`PWD` extraction
//! - **command**: command and working-directory resolution policy
//! - **foreground**: foreground-process-group inspection on the pty
//! - **lifecycle**: close-confirmation state machine and event dispatch
//! - **session**: asynchronous spawn and child-exit notifications
//!
//! # Architecture
//!
//! ```text
//! Lifecycle (close state + child pid)
//! ├── ForegroundInspect (tcgetpgrp + /proc, behind a trait)
//! └── Effects → event loop
//! Session (worker thread)
//! ├── pty master/slave pair
//! ├── reader thread → output channel
//! └── child wait → exit notice
//! ```

pub mod command;
pub mod env;
pub mod foreground;
pub mod lifecycle;
pub mod session;
