use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Run history database under $HOME/.local/state/runtrack
    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("runtrack");
            Some(state_dir.join("history.db"))
        } else {
            ProjectDirs::from("", "", "runtrack")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("history.db"))
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "runtrack").map(|pd| pd.config_dir().join("config.json"))
    }
}
