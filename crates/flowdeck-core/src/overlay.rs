use std::path::Path;

/// `--values <path>` when the overlay file exists, nothing otherwise.
///
/// Checked every time a command is built, since a scaffold step may create
/// the file between runs.
pub fn values_args(path: &Path) -> Vec<String> {
    if path.is_file() {
        vec!["--values".to_string(), path.display().to_string()]
    } else if path.exists() {
        tracing::warn!(path = %path.display(), "overlay path is not a regular file, no --values flag");
        Vec::new()
    } else {
        tracing::debug!(path = %path.display(), "overlay file absent, no --values flag");
        Vec::new()
    }
}
