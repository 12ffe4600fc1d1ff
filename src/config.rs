use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "CLASSROOMD_WORKSPACE";
pub const DEFAULT_LOG_DIRECTIVE: &str = "classroomd=info";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let workspace = std::env::var_os(WORKSPACE_ENV)
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty());
        Self { workspace }
    }
}
