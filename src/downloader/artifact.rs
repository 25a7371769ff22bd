//! Scratch-directory naming and artifact lookup.
//!
//! The tool decides the final extension during post-processing, so lookup
//! matches on the `{title}_{source}.` prefix only.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::DownloadError;

const MAX_COMPONENT_LEN: usize = 80;
const FALLBACK_TITLE: &str = "download";

/// Files the tool writes while still working.
const TEMP_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

/// Resolved output of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Reduce arbitrary text to `[A-Za-z0-9_-]`.
pub fn sanitize_component(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    mapped
        .trim_matches('_')
        .chars()
        .take(MAX_COMPONENT_LEN)
        .collect()
}

/// `{sanitizedTitle}_{sanitizedSourceID}`
pub fn output_stem(title: &str, source_id: &str) -> String {
    let mut title = sanitize_component(title);
    if title.is_empty() {
        title = FALLBACK_TITLE.to_string();
    }
    format!("{}_{}", title, sanitize_component(source_id))
}

/// Output template handed to the tool; it substitutes `%(ext)s` itself.
pub fn output_template(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.%(ext)s"))
}

fn is_temporary(name: &str) -> bool {
    TEMP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

async fn matching_files(dir: &Path, stem: &str, include_temporary: bool) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{stem}.");
    let mut matches = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.starts_with(&prefix) && (include_temporary || !is_temporary(name)) {
            matches.push(entry.path());
        }
    }

    Ok(matches)
}

async fn list_dir(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names
}

/// Locate and size the artifact for `stem`. The first match in directory
/// order wins.
pub async fn find_artifact(dir: &Path, stem: &str) -> Result<Artifact, DownloadError> {
    let matches = matching_files(dir, stem, false)
        .await
        .map_err(|source| DownloadError::ScratchDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let Some(path) = matches.into_iter().next() else {
        let listing = list_dir(dir).await;
        warn!(
            dir = %dir.display(),
            prefix = %stem,
            listing = ?listing,
            "No artifact found after successful download"
        );
        return Err(DownloadError::ArtifactNotFound {
            dir: dir.to_path_buf(),
            prefix: format!("{stem}."),
        });
    };

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| DownloadError::StatFailed {
            path: path.clone(),
            source,
        })?;

    Ok(Artifact {
        path,
        size: metadata.len(),
    })
}

/// Files already matching `stem`, temporaries included. Taken before a
/// download starts so cleanup leaves other jobs' output alone.
pub async fn existing_files(dir: &Path, stem: &str) -> HashSet<PathBuf> {
    matching_files(dir, stem, true)
        .await
        .map(|files| files.into_iter().collect())
        .unwrap_or_default()
}

/// Delete what a cancelled download left behind, temporaries included.
/// Paths in `keep` existed before the download started and survive.
pub async fn remove_partials(dir: &Path, stem: &str, keep: &HashSet<PathBuf>) -> usize {
    let Ok(matches) = matching_files(dir, stem, true).await else {
        return 0;
    };

    let mut removed = 0;
    for path in matches.into_iter().filter(|path| !keep.contains(path)) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove partial file"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_component("Song"), "Song");
        assert_eq!(sanitize_component("  My Song / Live! "), "My_Song___Live");
        assert_eq!(sanitize_component("https://youtu.be/x"), "https___youtu_be_x");
        assert_eq!(sanitize_component("???"), "");
        assert_eq!(sanitize_component(&"a".repeat(200)).len(), MAX_COMPONENT_LEN);
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("Song", "abc123"), "Song_abc123");
        assert_eq!(output_stem("", "abc123"), "download_abc123");
    }

    #[test]
    fn test_output_template() {
        let template = output_template(Path::new("/scratch"), "Song_abc123");
        assert_eq!(template, PathBuf::from("/scratch/Song_abc123.%(ext)s"));
    }

    #[tokio::test]
    async fn test_find_artifact_any_extension() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Song_abc123.mp3"), vec![0u8; 500_000]).unwrap();
        std::fs::write(temp_dir.path().join("Other_zzz.mp3"), b"x").unwrap();

        let artifact = find_artifact(temp_dir.path(), "Song_abc123").await.unwrap();
        assert!(artifact.path.ends_with("Song_abc123.mp3"));
        assert_eq!(artifact.size, 500_000);
    }

    #[tokio::test]
    async fn test_find_artifact_skips_temporaries() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Song_abc123.webm.part"), b"partial").unwrap();

        let err = find_artifact(temp_dir.path(), "Song_abc123").await.unwrap_err();
        assert!(matches!(err, DownloadError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_prefix_requires_dot() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Song_abc1234.mp3"), b"x").unwrap();

        let err = find_artifact(temp_dir.path(), "Song_abc123").await.unwrap_err();
        assert!(matches!(err, DownloadError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_partials() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Song_abc123.webm.part"), b"p").unwrap();
        std::fs::write(temp_dir.path().join("Song_abc123.f140.m4a"), b"p").unwrap();
        std::fs::write(temp_dir.path().join("Keep_me.mp3"), b"k").unwrap();

        assert_eq!(remove_partials(temp_dir.path(), "Song_abc123", &HashSet::new()).await, 2);
        assert!(temp_dir.path().join("Keep_me.mp3").exists());
    }

    #[tokio::test]
    async fn test_remove_partials_keeps_earlier_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Song_abc123.mp3"), b"done").unwrap();
        let before = existing_files(temp_dir.path(), "Song_abc123").await;
        assert_eq!(before.len(), 1);

        std::fs::write(temp_dir.path().join("Song_abc123.mp3.part"), b"p").unwrap();

        assert_eq!(remove_partials(temp_dir.path(), "Song_abc123", &before).await, 1);
        assert!(temp_dir.path().join("Song_abc123.mp3").exists());
        assert!(!temp_dir.path().join("Song_abc123.mp3.part").exists());
    }

    #[tokio::test]
    async fn test_existing_files_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(existing_files(&temp_dir.path().join("absent"), "Song_abc123").await.is_empty());
    }
}
