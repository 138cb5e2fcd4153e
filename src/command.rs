//! Command whitelist.
//!
//! Only the invoked binary is inspected: the command string is split with
//! POSIX shell-word rules, the first token is reduced to its basename and
//! lowercased, and admission requires set membership. This guards against
//! *accidental* misuse by an authorized principal; the container sandbox is
//! the actual security boundary.

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Configured set of admitted binaries.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: HashSet<String>,
}

impl CommandPolicy {
    /// Build a policy from a comma-separated list of binary names.
    pub fn from_csv(csv: &str) -> Self {
        let allowed = csv
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { allowed }
    }

    /// Check whether the command's binary is admitted.
    ///
    /// Empty or unparseable commands (e.g. unbalanced quotes) are rejected.
    pub fn is_allowed(&self, command: &str) -> bool {
        let stripped = command.trim();
        if stripped.is_empty() {
            return false;
        }
        let Some(words) = shlex::split(stripped) else {
            return false;
        };
        let Some(first) = words.first() else {
            return false;
        };
        let basename = first.rsplit('/').next().unwrap_or(first);
        self.allowed.contains(&basename.to_lowercase())
    }

    /// Admit the command or fail with `command-forbidden`.
    pub fn ensure_allowed(&self, command: &str) -> Result<()> {
        if self.is_allowed(command) {
            Ok(())
        } else {
            Err(Error::CommandForbidden)
        }
    }

    /// Number of admitted binaries.
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// True when no binary is admitted.
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CommandPolicy {
        CommandPolicy::from_csv("ls,cat,echo,python3,grep")
    }

    #[test]
    fn test_plain_command_allowed() {
        assert!(policy().is_allowed("echo hi"));
        assert!(policy().is_allowed("  ls -la /workspace  "));
    }

    #[test]
    fn test_unlisted_binary_rejected() {
        assert!(!policy().is_allowed("nc -l 1234"));
        assert!(!policy().is_allowed("rm -rf /"));
    }

    #[test]
    fn test_path_prefix_stripped() {
        assert!(policy().is_allowed("/bin/echo hi"));
        assert!(policy().is_allowed("/usr/local/bin/python3 -c 'print(1)'"));
        assert!(!policy().is_allowed("/usr/bin/nc host 80"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(policy().is_allowed("ECHO hi"));
        assert!(policy().is_allowed("Cat file.txt"));
    }

    #[test]
    fn test_quoted_arguments() {
        assert!(policy().is_allowed("grep 'a b c' file.txt"));
        assert!(policy().is_allowed(r#"echo "hello world""#));
    }

    #[test]
    fn test_empty_and_unparseable_rejected() {
        assert!(!policy().is_allowed(""));
        assert!(!policy().is_allowed("   "));
        // Unbalanced quote fails shell-word parsing
        assert!(!policy().is_allowed("echo 'unterminated"));
    }

    #[test]
    fn test_csv_parsing() {
        let policy = CommandPolicy::from_csv(" ls , CAT ,, echo ");
        assert_eq!(policy.len(), 3);
        assert!(policy.is_allowed("cat x"));
        assert!(!policy.is_empty());
    }

    #[test]
    fn test_ensure_allowed_error_kind() {
        let err = policy().ensure_allowed("nc -l 80").unwrap_err();
        assert!(matches!(err, Error::CommandForbidden));
    }
}
