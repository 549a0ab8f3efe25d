//! Exclusion policy for watcher and scan events.

use std::path::Path;

/// Suffixes of files that are still being written by another program.
pub const DEFAULT_EXCLUDE_SUFFIXES: &[&str] = &[
    ".tmp",
    ".temp",
    ".part",
    ".partial",
    ".crdownload",
    ".download",
    ".swp",
    ".swx",
    "~",
];

/// Decides which paths never enter the pipeline.
///
/// Dotfiles are always excluded; suffixes are matched case-insensitively
/// against the file name.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    suffixes: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDE_SUFFIXES.iter().map(|s| s.to_string()))
    }
}

impl ExclusionPolicy {
    pub fn new(suffixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return true;
        };
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            return true;
        }
        let lower = name.to_lowercase();
        self.suffixes.iter().any(|suffix| lower.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ExclusionPolicy::default();

        assert!(policy.is_excluded(Path::new("/media/.DS_Store")));
        assert!(policy.is_excluded(Path::new("/media/.track.flac.swp")));
        assert!(policy.is_excluded(Path::new("/media/album.zip.PART")));
        assert!(policy.is_excluded(Path::new("/media/notes.txt~")));
        assert!(policy.is_excluded(Path::new("/")));

        assert!(!policy.is_excluded(Path::new("/media/track.flac")));
        assert!(!policy.is_excluded(Path::new("/media/.hidden_dir/track.flac")));
    }

    #[test]
    fn test_custom_suffixes() {
        let policy = ExclusionPolicy::new(vec![".lock".to_string(), String::new()]);

        assert!(policy.is_excluded(Path::new("/media/db.LOCK")));
        assert!(!policy.is_excluded(Path::new("/media/file.tmp")));
        assert!(!policy.is_excluded(Path::new("/media/track.flac")));
    }
}
