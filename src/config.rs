use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "ROLLOVERD_WORKSPACE";
pub const LOG_ENV: &str = "ROLLOVERD_LOG";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Process-level settings. Workspace-level settings live in the `setup.*`
/// sections of the workspace database instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup(WORKSPACE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let log_filter = lookup(LOG_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            workspace,
            log_filter,
        }
    }
}
