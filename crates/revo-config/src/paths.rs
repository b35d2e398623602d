use std::path::PathBuf;

/// XDG app name used for config, state and log paths.
pub const APP_NAME: &str = "revo-agent";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// `~/.config/revo-agent` on Linux.
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// State directory (`~/.local/state/revo-agent`), falling back to the local
/// data dir on platforms without a state dir.
pub fn state_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf()
    })
}

pub fn state_dir_fallback() -> PathBuf {
    std::env::temp_dir().join(format!("{APP_NAME}-state"))
}

/// Default directory holding `memories.json`.
pub fn default_recall_dir() -> PathBuf {
    state_dir()
        .unwrap_or_else(state_dir_fallback)
        .join("recall")
}

/// Default global config file path.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_recall_dir_ends_with_recall() {
        let dir = default_recall_dir();
        assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("recall"));
    }

    #[test]
    fn test_state_dir_fallback_uses_app_name() {
        let fallback = state_dir_fallback();
        assert!(fallback.to_string_lossy().contains(APP_NAME));
    }

    #[test]
    fn test_default_config_path_is_toml() {
        if let Some(path) = default_config_path() {
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some("config.toml")
            );
        }
    }
}
