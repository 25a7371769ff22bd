//! Executable resolution: override, PATH lookup, interpreter-module fallback.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::DownloadError;
use crate::config::DownloaderConfig;

#[cfg(target_os = "windows")]
const PYTHON_CANDIDATES: &[&str] = &["python"];

#[cfg(not(target_os = "windows"))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Program plus any arguments that must precede the tool's own arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl Invocation {
    fn direct(program: PathBuf) -> Self {
        Self {
            program,
            leading_args: Vec::new(),
        }
    }
}

/// Resolve the downloader against the real PATH.
pub fn resolve_executable(config: &DownloaderConfig) -> Result<Invocation, DownloadError> {
    resolve_with(config, |name| which::which(name).ok())
}

pub(crate) fn resolve_with<F>(config: &DownloaderConfig, lookup: F) -> Result<Invocation, DownloadError>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let mut tried = Vec::new();

    if let Some(explicit) = config
        .executable
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let candidate = Path::new(explicit);
        let is_path = candidate.is_absolute() || candidate.components().count() > 1;

        let found = if is_path {
            candidate.is_file().then(|| candidate.to_path_buf())
        } else {
            lookup(explicit)
        };

        if let Some(program) = found {
            debug!(program = %program.display(), "Using downloader override");
            return Ok(Invocation::direct(program));
        }
        tried.push(explicit.to_string());
    }

    if let Some(program) = lookup(&config.tool_name) {
        debug!(program = %program.display(), "Found downloader on PATH");
        return Ok(Invocation::direct(program));
    }
    tried.push(config.tool_name.clone());

    for python in PYTHON_CANDIDATES {
        if let Some(program) = lookup(python) {
            debug!(
                program = %program.display(),
                module = %config.python_module,
                "Falling back to interpreter module"
            );
            return Ok(Invocation {
                program,
                leading_args: vec!["-m".to_string(), config.python_module.clone()],
            });
        }
    }
    tried.push(format!(
        "{} -m {}",
        PYTHON_CANDIDATES.join("|"),
        config.python_module
    ));

    Err(DownloadError::ExecutableNotFound {
        tried: tried.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_in(table: &[(&str, &str)]) -> impl Fn(&str) -> Option<PathBuf> {
        let table: HashMap<String, PathBuf> = table
            .iter()
            .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
            .collect();
        move |name| table.get(name).cloned()
    }

    #[test]
    fn test_override_path_wins() {
        let temp_dir = TempDir::new().unwrap();
        let tool = temp_dir.path().join("my-downloader");
        std::fs::write(&tool, "").unwrap();

        let config = DownloaderConfig {
            executable: Some(tool.to_string_lossy().into_owned()),
            ..DownloaderConfig::default()
        };

        let resolved = resolve_with(&config, lookup_in(&[("yt-dlp", "/usr/bin/yt-dlp")])).unwrap();
        assert_eq!(resolved.program, tool);
        assert!(resolved.leading_args.is_empty());
    }

    #[test]
    fn test_override_command_uses_lookup() {
        let config = DownloaderConfig {
            executable: Some("youtube-dl".to_string()),
            ..DownloaderConfig::default()
        };

        let resolved = resolve_with(
            &config,
            lookup_in(&[("youtube-dl", "/opt/bin/youtube-dl"), ("yt-dlp", "/usr/bin/yt-dlp")]),
        )
        .unwrap();
        assert_eq!(resolved.program, PathBuf::from("/opt/bin/youtube-dl"));
    }

    #[test]
    fn test_missing_override_falls_through_to_path() {
        let config = DownloaderConfig {
            executable: Some("/definitely/not/here/yt-dlp".to_string()),
            ..DownloaderConfig::default()
        };

        let resolved = resolve_with(&config, lookup_in(&[("yt-dlp", "/usr/bin/yt-dlp")])).unwrap();
        assert_eq!(resolved.program, PathBuf::from("/usr/bin/yt-dlp"));
    }

    #[test]
    fn test_python_module_fallback() {
        let config = DownloaderConfig::default();
        let resolved = resolve_with(&config, lookup_in(&[("python", "/usr/bin/python")])).unwrap();

        assert_eq!(resolved.program, PathBuf::from("/usr/bin/python"));
        assert_eq!(resolved.leading_args, vec!["-m".to_string(), "yt_dlp".to_string()]);
    }

    #[test]
    fn test_nothing_found() {
        let config = DownloaderConfig {
            executable: Some("custom-dl".to_string()),
            ..DownloaderConfig::default()
        };

        let err = resolve_with(&config, lookup_in(&[])).unwrap_err();
        match err {
            DownloadError::ExecutableNotFound { tried } => {
                assert!(tried.contains("custom-dl"));
                assert!(tried.contains("yt-dlp"));
                assert!(tried.contains("yt_dlp"));
            }
            other => panic!("Expected ExecutableNotFound, got {other:?}"),
        }
    }
}
