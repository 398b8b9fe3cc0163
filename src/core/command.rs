//! Command resolution
//!
//! Decides the argument vector and working directory for the session
//! child. Resolution never fails: every absent input falls through to a
//! defined default.

use std::env;
use std::path::PathBuf;

/// Used when no explicit command was given and `SHELL` is unusable.
pub const FALLBACK_SHELL: &str = "/bin/bash";

/// Resolved spawn target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    /// Executable plus arguments, never empty.
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

/// Resolve what to run and where.
///
/// Command priority: an explicit command is used verbatim; otherwise a
/// non-empty `SHELL` value becomes a one-element vector (no forced
/// interactive/login arguments); otherwise `/bin/bash`. The working
/// directory is `PWD` when non-empty, else the user's home directory.
pub fn resolve(explicit: Option<&[String]>, shell: Option<&str>, pwd: Option<&str>) -> SpawnPlan {
    let argv = match explicit {
        Some(args) if !args.is_empty() => args.to_vec(),
        _ => match shell {
            Some(sh) if !sh.is_empty() => vec![sh.to_string()],
            _ => vec![FALLBACK_SHELL.to_string()],
        },
    };

    let cwd = match pwd {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home_dir().unwrap_or_else(|| PathBuf::from("/")),
    };

    SpawnPlan { argv, cwd }
}

/// Home directory from the environment, no extra dependencies.
pub fn home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_explicit_command_wins() {
        let explicit = strings(&["vim", "notes.txt"]);
        let plan = resolve(Some(&explicit), Some("/usr/bin/zsh"), Some("/tmp"));
        assert_eq!(plan.argv, explicit);
    }

    #[test]
    fn test_shell_over_fallback() {
        let plan = resolve(None, Some("/usr/bin/zsh"), None);
        assert_eq!(plan.argv, strings(&["/usr/bin/zsh"]));
    }

    #[test]
    fn test_empty_shell_falls_back() {
        let plan = resolve(None, Some(""), None);
        assert_eq!(plan.argv, strings(&[FALLBACK_SHELL]));
    }

    #[test]
    fn test_no_inputs_uses_fallback_and_home() {
        let plan = resolve(None, None, None);
        assert_eq!(plan.argv, strings(&["/bin/bash"]));
        let expected = home_dir().unwrap_or_else(|| PathBuf::from("/"));
        assert_eq!(plan.cwd, expected);
    }

    #[test]
    fn test_pwd_used_when_present() {
        let plan = resolve(None, None, Some("/var/log"));
        assert_eq!(plan.cwd, PathBuf::from("/var/log"));
    }

    #[test]
    fn test_empty_pwd_ignored() {
        let plan = resolve(None, None, Some(""));
        let expected = home_dir().unwrap_or_else(|| PathBuf::from("/"));
        assert_eq!(plan.cwd, expected);
    }
}
