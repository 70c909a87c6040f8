use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "gradebookd=info";

/// Startup settings. Everything else arrives over IPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Workspace to open before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl Config {
    /// Reads `GRADEBOOKD_WORKSPACE` and `GRADEBOOKD_LOG`, after loading a
    /// `.env` file when one is present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup("GRADEBOOKD_WORKSPACE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let log_filter = lookup("GRADEBOOKD_LOG")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Config {
            workspace,
            log_filter,
        }
    }
}
