//! Sibling-file heuristics.
//!
//! Candidates come from the subject's own directory only and are ranked in
//! three tiers:
//!
//! 1. same stem, different extension (`track.cue` next to `track.flac`)
//! 2. sidecar names (`tracklist`, `tracks`, `info`, `readme`)
//! 3. same first three characters of the file name
//!
//! Within a tier, paths are taken in lexicographic order.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::MAX_NEIGHBORS;

/// Lowercase names that mark a file as a sidecar for anything next to it.
pub const SIDECAR_KEYWORDS: [&str; 4] = ["tracklist", "tracks", "info", "readme"];

/// Characters compared by the prefix tier.
pub const PREFIX_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct NeighborResolver {
    limit: usize,
}

impl Default for NeighborResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborResolver {
    pub fn new() -> Self {
        Self {
            limit: MAX_NEIGHBORS,
        }
    }

    /// Resolver with a lower cap. Values above [`MAX_NEIGHBORS`] are clamped.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.min(MAX_NEIGHBORS),
        }
    }

    /// Ranked related files for `path`.
    ///
    /// Never fails: an unreadable directory means no neighbors.
    pub fn resolve(&self, path: &Path) -> Vec<PathBuf> {
        match self.try_resolve(path) {
            Ok(neighbors) => neighbors,
            Err(e) => {
                crate::debug_event!(
                    "neighbors",
                    "directory unreadable",
                    "{}: {e}",
                    path.display()
                );
                Vec::new()
            }
        }
    }

    fn try_resolve(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Ok(Vec::new());
        };

        let siblings = list_siblings(dir, path)?;
        Ok(rank(path, name, &siblings, self.limit))
    }
}

/// Regular files in `dir` other than `subject`, sorted by path.
fn list_siblings(dir: &Path, subject: &Path) -> io::Result<Vec<PathBuf>> {
    let mut siblings = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let candidate = entry.path();
        if candidate == subject || candidate.file_name() == subject.file_name() {
            continue;
        }
        // Follows symlinks so linked sidecars still count.
        if candidate.is_file() {
            siblings.push(candidate);
        }
    }
    siblings.sort();
    Ok(siblings)
}

fn rank(subject: &Path, name: &OsStr, siblings: &[PathBuf], limit: usize) -> Vec<PathBuf> {
    let stem = subject.file_stem();
    let extension = subject.extension();
    let lower_name = name.to_string_lossy().to_lowercase();
    let prefix: Option<String> = {
        let chars: Vec<char> = lower_name.chars().take(PREFIX_LEN).collect();
        (chars.len() == PREFIX_LEN).then(|| chars.into_iter().collect())
    };

    let same_stem = |p: &PathBuf| p.file_stem() == stem && p.extension() != extension;
    let sidecar = |p: &PathBuf| is_sidecar(p);
    let same_prefix = |p: &PathBuf| match (&prefix, p.file_name()) {
        (Some(prefix), Some(other)) => other.to_string_lossy().to_lowercase().starts_with(prefix),
        _ => false,
    };
    let tiers: [&dyn Fn(&PathBuf) -> bool; 3] = [&same_stem, &sidecar, &same_prefix];

    let mut ranked: Vec<PathBuf> = Vec::with_capacity(limit);
    for tier in tiers {
        for candidate in siblings.iter().filter(|p| tier(*p)) {
            if ranked.len() == limit {
                return ranked;
            }
            if !ranked.contains(candidate) {
                ranked.push(candidate.clone());
            }
        }
    }
    ranked
}

/// Matches on the whole lowercase name or on its stem, so both `README`
/// and `tracklist.txt` qualify.
fn is_sidecar(path: &Path) -> bool {
    let matches = |s: Option<&OsStr>| {
        s.map(|s| s.to_string_lossy().to_lowercase())
            .is_some_and(|s| SIDECAR_KEYWORDS.contains(&s.as_str()))
    };
    matches(path.file_name()) || matches(path.file_stem())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"x").unwrap();
        }
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_same_stem_sibling() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["track.flac", "track.cue"]);

        let neighbors = NeighborResolver::new().resolve(&temp.path().join("track.flac"));
        assert_eq!(neighbors, vec![temp.path().join("track.cue")]);
    }

    #[test]
    fn test_tier_order() {
        let temp = TempDir::new().unwrap();
        touch(
            temp.path(),
            &[
                "album.flac",
                "album.cue",
                "album.log",
                "Tracklist.txt",
                "info.nfo",
                "README",
                "alb_cover.jpg",
                "unrelated.mp3",
            ],
        );
        fs::create_dir(temp.path().join("album.d")).unwrap();

        let neighbors = NeighborResolver::new().resolve(&temp.path().join("album.flac"));
        assert_eq!(
            names(&neighbors),
            vec![
                "album.cue",
                "album.log",
                "README",
                "Tracklist.txt",
                "info.nfo",
                "alb_cover.jpg",
            ]
        );
    }

    #[test]
    fn test_candidate_in_several_tiers_listed_once() {
        let temp = TempDir::new().unwrap();
        // "info.txt" matches the stem tier and the sidecar tier.
        touch(temp.path(), &["info.flac", "info.txt", "inferno.mp3"]);

        let neighbors = NeighborResolver::new().resolve(&temp.path().join("info.flac"));
        assert_eq!(names(&neighbors), vec!["info.txt", "inferno.mp3"]);
    }

    #[test]
    fn test_cap_keeps_lexicographic_top_ten() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["track.flac"]);
        let extensions: Vec<String> = (0..12).map(|i| format!("track.e{i:02}")).collect();
        for ext in &extensions {
            fs::write(temp.path().join(ext), b"x").unwrap();
        }

        let subject = temp.path().join("track.flac");
        let neighbors = NeighborResolver::new().resolve(&subject);

        assert_eq!(neighbors.len(), MAX_NEIGHBORS);
        assert!(!neighbors.contains(&subject));
        assert_eq!(names(&neighbors), extensions[..10].to_vec());
    }

    #[test]
    fn test_short_names_skip_prefix_tier() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["ab", "abc.mp3", "abz.mp3"]);

        let neighbors = NeighborResolver::new().resolve(&temp.path().join("ab"));
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_unreadable_directory_yields_nothing() {
        let neighbors = NeighborResolver::new().resolve(Path::new("/nonexistent/dir/track.flac"));
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_with_limit() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["a.flac", "a.cue", "a.log", "a.txt"]);

        let neighbors = NeighborResolver::with_limit(2).resolve(&temp.path().join("a.flac"));
        assert_eq!(names(&neighbors), vec!["a.cue", "a.log"]);
    }
}
