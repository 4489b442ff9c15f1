use std::path::{Path, PathBuf};

/// OS-specific filesystem details behind a common interface so call sites
/// stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory holding `config.toml` and the job store.
    /// Unix: `~/.docpack`, Windows: `%APPDATA%\docpack`.
    fn data_dir() -> PathBuf;
}

pub const DATA_DIR_ENV: &str = "DOCPACK_DATA_DIR";

/// `DOCPACK_DATA_DIR` wins over the platform default when set and non-empty.
fn resolve_data_dir(default: PathBuf) -> PathBuf {
    resolve_data_dir_with(default, |key| std::env::var(key).ok())
}

fn resolve_data_dir_with<F>(default: PathBuf, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(DATA_DIR_ENV) {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_replaces_default() {
        let dir = resolve_data_dir_with(PathBuf::from("/home/u/.docpack"), |_| {
            Some("/srv/docpack".to_string())
        });
        assert_eq!(dir, PathBuf::from("/srv/docpack"));
    }

    #[test]
    fn blank_override_is_ignored() {
        let dir = resolve_data_dir_with(PathBuf::from("/home/u/.docpack"), |_| {
            Some("  ".to_string())
        });
        assert_eq!(dir, PathBuf::from("/home/u/.docpack"));
    }
}
