use flowdeck_core::settings::SETTINGS_FILE;
use std::path::{Path, PathBuf};

/// Resolve the project root that relative file parameters are joined to.
///
/// Priority:
/// 1. `--root` flag / `FLOWDECK_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `flowdeck.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(explicit, &cwd)
}

fn resolve_from(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    cwd.ancestors()
        .find(|dir| dir.join(SETTINGS_FILE).is_file())
        .unwrap_or(cwd)
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        std::fs::write(other.path().join(SETTINGS_FILE), "params: {}\n").unwrap();
        assert_eq!(resolve_from(Some(dir.path()), other.path()), dir.path());
    }

    #[test]
    fn finds_settings_file_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "params: {}\n").unwrap();
        let deep = dir.path().join("charts/overlays");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(resolve_from(None, &deep), dir.path());
    }

    #[test]
    fn falls_back_to_cwd() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a/b");
        std::fs::create_dir_all(&deep).unwrap();
        // Assumes no flowdeck.yaml above the temp dir.
        assert_eq!(resolve_from(None, &deep), deep);
    }
}
