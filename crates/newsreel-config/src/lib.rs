//! Configuration for the newsreel client.
//!
//! The file format is one `Key=Value` per line with `#` comments. Values may
//! refer to earlier keys as `${Key}` and may start with `~` for the home
//! directory.

mod error;
mod model;
mod parse;

use std::path::{Path, PathBuf};

pub use crate::error::ConfigError;
pub use crate::model::{Config, DEFAULT_NNTPS_PORT, DEFAULT_NNTP_PORT};
pub use crate::parse::{apply_overrides, interpolate, parse_bool, parse_config};

/// Read `path`, apply `Key=Value` overrides on top and build the model.
pub fn load_config(path: &Path, overrides: &[String]) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut raw = parse_config(&content)?;
    apply_overrides(&mut raw, overrides)?;
    Config::from_raw(raw)
}

/// First existing file among the per-user and system-wide locations.
pub fn default_config_path() -> Option<PathBuf> {
    let candidates = [
        dirs::config_dir().map(|d| d.join("newsreel").join("newsreel.conf")),
        Some(PathBuf::from("/etc/newsreel.conf")),
    ];
    candidates.into_iter().flatten().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_config_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(tmp, "# news server").expect("write");
        writeln!(tmp, "Host=news.example.com").expect("write");
        writeln!(tmp, "Username=reader").expect("write");
        writeln!(tmp, "Encryption=yes").expect("write");

        let config = load_config(tmp.path(), &[]).expect("load");
        assert_eq!(config.host, "news.example.com");
        assert_eq!(config.port, DEFAULT_NNTPS_PORT);
        assert_eq!(config.username.as_deref(), Some("reader"));
        assert!(config.encryption);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(tmp, "Host=news.example.com").expect("write");
        writeln!(tmp, "Port=119").expect("write");

        let overrides = vec!["Port=1119".to_string(), "LogLevel = debug".to_string()];
        let config = load_config(tmp.path(), &overrides).expect("load");
        assert_eq!(config.port, 1119);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn load_config_returns_error_for_missing_file() {
        let err = load_config(Path::new("/nonexistent/newsreel.conf"), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(tmp, "Host=news.example.com").expect("write");

        let err = load_config(tmp.path(), &["Port".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride(_)));
    }
}
