//! Path resolution utilities

use crate::CliError;
use std::path::{Path, PathBuf};

/// Get the current working directory
pub fn current_dir() -> Result<PathBuf, CliError> {
    std::env::current_dir().map_err(|e| CliError::Io(e))
}

/// Resolve a path relative to the current directory
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<PathBuf, CliError> {
    let path = path.as_ref();
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_dir()?.join(path))
    }
}

/// Find a file by walking up the directory tree
/// Returns the path to the file if found
pub fn find_file_upward<P: AsRef<Path>>(filename: P) -> Option<PathBuf> {
    let filename = filename.as_ref();
    let mut current = current_dir().ok()?;

    loop {
        let target = current.join(filename);
        if target.exists() {
            return Some(target);
        }

        // Move to parent directory
        if !current.pop() {
            // Reached the root
            return None;
        }
    }
}

/// Find the project root by looking for common project markers
/// Checks for: Cargo.toml, package.json, .git
pub fn find_project_root() -> Option<PathBuf> {
    let markers = ["Cargo.toml", "package.json", ".git"];

    for marker in markers {
        if let Some(path) = find_file_upward(Path::new(marker))
            && let Some(parent) = path.parent()
        {
            return Some(parent.to_path_buf());
        }
    }

    None
}

/// Get the config directory.
/// Platform-specific:
/// - macOS/Linux: ~/.config/dagflow
/// - Windows: %APPDATA%\dagflow
pub fn dagflow_config_dir() -> Result<PathBuf, CliError> {
    let config_dir = dirs_next::config_dir()
        .ok_or_else(|| CliError::Other("Failed to determine config directory".to_string()))?;

    Ok(config_dir.join("dagflow"))
}

/// Get the data directory.
/// Platform-specific:
/// - macOS: ~/Library/Application Support/dagflow
/// - Linux: ~/.local/share/dagflow
/// - Windows: %LOCALAPPDATA%\dagflow
pub fn dagflow_data_dir() -> Result<PathBuf, CliError> {
    let data_dir = dirs_next::data_local_dir()
        .ok_or_else(|| CliError::Other("Failed to determine data directory".to_string()))?;

    Ok(data_dir.join("dagflow"))
}

/// Get the cache directory.
pub fn dagflow_cache_dir() -> Result<PathBuf, CliError> {
    let cache_dir = dirs_next::cache_dir()
        .ok_or_else(|| CliError::Other("Failed to determine cache directory".to_string()))?;

    Ok(cache_dir.join("dagflow"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf, CliError> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)
        .map_err(|e| CliError::Other(format!("Failed to create directory {}: {}", path.display(), e)))?;
    Ok(path.to_path_buf())
}

/// Create the config directory if it doesn't exist.
pub fn ensure_dagflow_config_dir() -> Result<PathBuf, CliError> {
    ensure_dir(&dagflow_config_dir()?)
}

/// Create the data directory if it doesn't exist.
pub fn ensure_dagflow_data_dir() -> Result<PathBuf, CliError> {
    ensure_dir(&dagflow_data_dir()?)
}

/// Normalize a path for display
pub fn normalize_path<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    if let Ok(cwd) = std::env::current_dir()
        && let Ok(rel) = path.strip_prefix(&cwd)
    {
        return rel.display().to_string();
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let result = resolve_path("Cargo.toml").unwrap();
        assert!(result.ends_with("Cargo.toml"));
    }

    #[test]
    fn test_find_project_root() {
        let root = find_project_root();
        assert!(root.is_some());
        let root = root.unwrap();
        assert!(root.join("Cargo.toml").exists() || root.join("crates").exists());
    }

    #[test]
    fn test_dagflow_dirs() {
        let config_dir = dagflow_config_dir();
        assert!(config_dir.is_ok());
        assert!(config_dir.unwrap().ends_with("dagflow"));
    }
}
