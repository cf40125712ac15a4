use serde::Deserialize;

use crate::policy::PermissionRule;

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_shell() -> String {
    "bash".to_owned()
}

fn default_max_search_results() -> usize {
    100
}

fn default_audit_destination() -> String {
    "stdout".to_owned()
}

/// Top-level configuration for tool execution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Shell-specific configuration: interpreter, timeout, and sandbox policy inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Per-command timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Run commands through a login shell (`-lc`) so profile environment applies.
    #[serde(default = "default_true")]
    pub login: bool,
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Absolute paths a command may reference. Empty disables path confinement.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_network: bool,
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            shell: default_shell(),
            login: true,
            blocked_commands: Vec::new(),
            allowed_commands: Vec::new(),
            allowed_paths: Vec::new(),
            allow_network: true,
            permissions: Vec::new(),
        }
    }
}

/// File tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Roots file tools may touch. Empty means the current directory.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            allowed_paths: Vec::new(),
            max_search_results: default_max_search_results(),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `stdout` (through tracing) or a file path for JSON lines.
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: default_audit_destination(),
        }
    }
}
