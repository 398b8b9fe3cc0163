//! Foreground process inspection
//!
//! Answers "is something besides the shell running in this terminal?"
//! when a close is requested. The platform query lives behind a trait so
//! the classification rules stay testable without a live pty.

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::path::Path;

/// A multiplexer manages its own sessions and survives this terminal, so
/// it never counts as unsaved work.
const MULTIPLEXER_NAME: &str = "tmux";

/// Raw answer from the platform query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundQuery {
    /// Foreground process group id, -1 when unavailable.
    pub pid: i32,
    /// Base name of the foreground process, empty when the lookup failed.
    pub name: String,
}

/// Platform capability for the foreground-group query on a pty.
pub trait ForegroundInspect {
    /// `None` when there is no pty, the descriptor is invalid, or the
    /// group query itself fails.
    fn query(&self) -> Option<ForegroundQuery>;
}

/// Classify the query result against the session's child pid.
///
/// The default is "a foreground process exists". It is suppressed only
/// when the query yielded nothing, when the name is exactly `tmux`, or
/// when the pid is the session child itself (or the -1 sentinel). A
/// failed name lookup gives an empty name and falls through to the pid
/// comparison.
pub fn have_foreground_process(inspector: &dyn ForegroundInspect, child_pid: i32) -> bool {
    let query = match inspector.query() {
        Some(query) => query,
        None => return false,
    };
    if query.name == MULTIPLEXER_NAME {
        return false;
    }
    if query.pid == -1 || query.pid == child_pid {
        return false;
    }
    true
}

/// Inspector bound to the session's pty descriptor, if one exists.
pub struct PtyForeground {
    #[cfg_attr(not(unix), allow(dead_code))]
    fd: Option<i32>,
}

impl PtyForeground {
    pub fn new(fd: Option<i32>) -> Self {
        Self { fd }
    }
}

#[cfg(unix)]
impl ForegroundInspect for PtyForeground {
    fn query(&self) -> Option<ForegroundQuery> {
        let fd = self.fd?;
        if fd < 0 {
            return None;
        }
        let pid = unsafe { libc::tcgetpgrp(fd) };
        if pid == -1 {
            return None;
        }
        let pid = pid as i32;
        Some(ForegroundQuery {
            pid,
            name: process_base_name(pid),
        })
    }
}

#[cfg(not(unix))]
impl ForegroundInspect for PtyForeground {
    fn query(&self) -> Option<ForegroundQuery> {
        None
    }
}

/// Best-effort name lookup through the process table. Any failure
/// resolves to an empty string.
#[cfg(unix)]
fn process_base_name(pid: i32) -> String {
    match fs::read(format!("/proc/{}/cmdline", pid)) {
        Ok(raw) => base_name_of(&raw),
        Err(_) => String::new(),
    }
}

/// Base name of the first NUL-terminated argument in a cmdline record.
#[cfg(unix)]
fn base_name_of(cmdline: &[u8]) -> String {
    let first = cmdline.split(|byte| *byte == 0).next().unwrap_or(&[]);
    let arg = String::from_utf8_lossy(first);
    Path::new(arg.as_ref())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(Option<ForegroundQuery>);

    impl ForegroundInspect for Stub {
        fn query(&self) -> Option<ForegroundQuery> {
            self.0.clone()
        }
    }

    fn stub(pid: i32, name: &str) -> Stub {
        Stub(Some(ForegroundQuery {
            pid,
            name: name.to_string(),
        }))
    }

    #[test]
    fn test_no_query_result_means_safe_to_close() {
        assert!(!have_foreground_process(&Stub(None), 100));
    }

    #[test]
    fn test_tmux_never_counts_even_with_distinct_pid() {
        assert!(!have_foreground_process(&stub(4242, "tmux"), 100));
    }

    #[test]
    fn test_child_itself_is_not_foreground() {
        assert!(!have_foreground_process(&stub(100, "bash"), 100));
    }

    #[test]
    fn test_sentinel_pid_is_not_foreground() {
        assert!(!have_foreground_process(&stub(-1, ""), 100));
    }

    #[test]
    fn test_other_process_is_foreground() {
        assert!(have_foreground_process(&stub(4242, "vim"), 100));
    }

    #[test]
    fn test_failed_name_lookup_still_counts() {
        assert!(have_foreground_process(&stub(4242, ""), 100));
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_descriptor_yields_no_query() {
        assert_eq!(PtyForeground::new(None).query(), None);
        assert_eq!(PtyForeground::new(Some(-1)).query(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_base_name_of_cmdline() {
        assert_eq!(base_name_of(b"/usr/bin/vim\0notes.txt\0"), "vim");
        assert_eq!(base_name_of(b"bash\0"), "bash");
        assert_eq!(base_name_of(b""), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_own_process_name_resolves() {
        let name = process_base_name(std::process::id() as i32);
        assert!(!name.is_empty());
    }
}
