use std::path::PathBuf;

use glob::Pattern;
use serde::Deserialize;

use crate::config::ShellConfig;

const DEFAULT_BLOCKED: &[&str] = &[
    "rm -rf /", "sudo", "mkfs", "dd if=", "shutdown", "reboot", "halt",
];

const NETWORK_COMMANDS: &[&str] = &["curl", "wget", "nc ", "ncat", "netcat"];

/// Action a permission rule resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Deny,
}

/// Single permission rule: glob `pattern` over the whole command line + action.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRule {
    pub pattern: String,
    pub action: PermissionAction,
}

/// Policy the default sandbox evaluates before spawning anything.
///
/// Explicit permission rules are consulted first (first matching glob wins).
/// Commands no rule matches fall back to the substring blocklist. Absolute
/// paths in the command must sit under an allowed root when roots are set.
#[derive(Debug, Clone, Default)]
pub struct SandboxPolicy {
    rules: Vec<PermissionRule>,
    blocked_commands: Vec<String>,
    allowed_paths: Vec<PathBuf>,
}

impl SandboxPolicy {
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        let allowed: Vec<String> = config
            .allowed_commands
            .iter()
            .map(|s| s.to_lowercase())
            .collect();

        let mut blocked: Vec<String> = DEFAULT_BLOCKED
            .iter()
            .filter(|s| !allowed.contains(&s.to_lowercase()))
            .map(|s| (*s).to_owned())
            .collect();
        blocked.extend(config.blocked_commands.iter().map(|s| s.to_lowercase()));

        if !config.allow_network {
            blocked.extend(
                NETWORK_COMMANDS
                    .iter()
                    .filter(|s| !allowed.contains(&s.to_lowercase()))
                    .map(|s| (*s).to_owned()),
            );
        }

        blocked.sort();
        blocked.dedup();

        Self {
            rules: config.permissions.clone(),
            blocked_commands: blocked,
            allowed_paths: config
                .allowed_paths
                .iter()
                .map(|p| {
                    let path = PathBuf::from(p);
                    path.canonicalize().unwrap_or(path)
                })
                .collect(),
        }
    }

    /// Reason `command` must not run, or `None` when it may.
    #[must_use]
    pub fn denial(&self, command: &str) -> Option<String> {
        match self.matching_rule(command) {
            Some(rule) if rule.action == PermissionAction::Deny => {
                return Some(format!("denied by permission rule: {}", rule.pattern));
            }
            Some(_) => {}
            None => {
                if let Some(blocked) = self.find_blocked_command(command) {
                    return Some(format!("blocked command: {blocked}"));
                }
            }
        }
        self.find_disallowed_path(command)
            .map(|path| format!("path not allowed by sandbox: {path}"))
    }

    fn matching_rule(&self, command: &str) -> Option<&PermissionRule> {
        let normalized = command.to_lowercase();
        self.rules.iter().find(|rule| {
            Pattern::new(&rule.pattern.to_lowercase()).is_ok_and(|pat| pat.matches(&normalized))
        })
    }

    fn find_blocked_command(&self, command: &str) -> Option<&str> {
        let normalized = command.to_lowercase();
        self.blocked_commands
            .iter()
            .find(|blocked| normalized.contains(blocked.as_str()))
            .map(String::as_str)
    }

    fn find_disallowed_path(&self, command: &str) -> Option<String> {
        if self.allowed_paths.is_empty() {
            return None;
        }
        extract_absolute_paths(command).into_iter().find_map(|token| {
            let path = PathBuf::from(token);
            let canonical = path.canonicalize().unwrap_or(path);
            let allowed = self
                .allowed_paths
                .iter()
                .any(|root| canonical.starts_with(root));
            (!allowed).then(|| canonical.display().to_string())
        })
    }
}

fn extract_absolute_paths(command: &str) -> Vec<&str> {
    command
        .split_whitespace()
        .map(|token| token.trim_matches(['"', '\'']))
        .filter(|token| token.starts_with('/'))
        .map(|token| token.trim_end_matches([';', '&', '|']))
        .filter(|t| !t.is_empty())
        .collect()
}
