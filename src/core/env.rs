//! Child environment construction
//!
//! Builds the environment handed to the spawned process from the host
//! environment: terminal-specific variables are dropped so the child
//! negotiates its own, and the values needed for command resolution
//! (`SHELL`, `PWD`) are pulled out along the way.

use std::collections::BTreeMap;
use std::env;

/// Variables never inherited by the child.
pub const DENY_LIST: [&str; 5] = ["TERM", "COLUMNS", "LINES", "TERMCAP", "GNOME_DESKTOP_ICON"];

/// Terminal type advertised to the child and exported to the host process.
pub const SESSION_TERM: &str = "xterm-256color";

/// Sanitized environment plus the values extracted for command resolution.
///
/// Keys are unique (last write wins) and iterate in sorted order, so the
/// serialized form is deterministic within a run.
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, Option<String>>,
    /// Value of `SHELL`, if present with a value.
    pub shell: Option<String>,
    /// Value of `PWD`, if present with a value.
    pub pwd: Option<String>,
}

impl EnvironmentSnapshot {
    /// Build a snapshot from raw `KEY=VALUE` or bare `KEY` entries.
    ///
    /// Entries split at the first `=`; a bare key maps to an absent value.
    /// The deny-listed keys are removed unconditionally, whether or not the
    /// input contained them.
    pub fn build<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars: BTreeMap<String, Option<String>> = BTreeMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((key, value)) => vars.insert(key.to_string(), Some(value.to_string())),
                None => vars.insert(entry.to_string(), None),
            };
        }
        for key in DENY_LIST {
            vars.remove(key);
        }

        let shell = vars.get("SHELL").cloned().flatten();
        let pwd = vars.get("PWD").cloned().flatten();

        Self { vars, shell, pwd }
    }

    /// Capture and sanitize the live process environment.
    pub fn from_process() -> Self {
        Self::build(env::vars_os().map(|(key, value)| {
            format!("{}={}", key.to_string_lossy(), value.to_string_lossy())
        }))
    }

    /// Flat `(key, value)` sequence for the spawner. Absent values
    /// serialize as the empty string.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().unwrap_or_default()))
            .collect()
    }
}

/// Set `TERM` in the host process environment. Done once, after
/// sanitization, so host-side lookups later in the run observe the session
/// terminal type rather than whatever the host shell advertised.
pub fn export_session_term() {
    env::set_var("TERM", SESSION_TERM);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[&str]) -> Vec<(String, String)> {
        EnvironmentSnapshot::build(entries.iter().copied()).to_pairs()
    }

    #[test]
    fn test_deny_list_removed() {
        let out = pairs(&[
            "TERM=xterm",
            "COLUMNS=80",
            "LINES=24",
            "TERMCAP=old",
            "GNOME_DESKTOP_ICON=term.png",
            "HOME=/home/u",
        ]);
        for (key, _) in &out {
            assert!(!DENY_LIST.contains(&key.as_str()), "{} leaked through", key);
        }
        assert_eq!(out, vec![("HOME".to_string(), "/home/u".to_string())]);
    }

    #[test]
    fn test_deny_list_removed_when_absent() {
        let out = pairs(&["HOME=/home/u"]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let out = pairs(&["PATH=/old", "PATH=/new"]);
        assert_eq!(out, vec![("PATH".to_string(), "/new".to_string())]);
    }

    #[test]
    fn test_split_at_first_equals() {
        let out = pairs(&["LS_COLORS=di=34:ln=36"]);
        assert_eq!(out[0].1, "di=34:ln=36");
    }

    #[test]
    fn test_bare_key_serializes_empty() {
        let out = pairs(&["MARKER"]);
        assert_eq!(out, vec![("MARKER".to_string(), String::new())]);
    }

    #[test]
    fn test_shell_and_pwd_extracted() {
        let snap = EnvironmentSnapshot::build(["SHELL=/usr/bin/zsh", "PWD=/tmp/work"]);
        assert_eq!(snap.shell.as_deref(), Some("/usr/bin/zsh"));
        assert_eq!(snap.pwd.as_deref(), Some("/tmp/work"));
    }

    #[test]
    fn test_bare_shell_extracts_as_absent() {
        let snap = EnvironmentSnapshot::build(["SHELL"]);
        assert_eq!(snap.shell, None);
    }

    #[test]
    fn test_sanitize_is_fixed_point() {
        let first = pairs(&["TERM=xterm", "B=2", "A=1", "BARE", "A=3"]);
        let serialized: Vec<String> = first
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        let second = EnvironmentSnapshot::build(&serialized).to_pairs();
        assert_eq!(first, second);
    }

    #[test]
    fn test_deterministic_order() {
        let a = pairs(&["Z=1", "A=2", "M=3"]);
        let b = pairs(&["M=3", "Z=1", "A=2"]);
        assert_eq!(a, b);
    }
}
