//! Library index
//!
//! Enumerates playable tracks beneath the storage root. Every call reflects
//! the current filesystem; nothing is cached.

use crate::audio::decoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Root-relative path naming a playable file, with `/` separators
///
/// Compared by string equality: the same file queued twice yields two equal
/// identifiers, and remove/move always target the first match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Read-only view of the playable files under a storage root
#[derive(Debug, Clone)]
pub struct LibraryIndex {
    root: PathBuf,
    /// Lowercase extensions without the leading dot
    extensions: Vec<String>,
}

impl LibraryIndex {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// True when `name` ends in an allow-listed extension (case-insensitive)
    pub fn has_playable_extension(&self, name: &Path) -> bool {
        name.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == e)
            })
            .unwrap_or(false)
    }

    /// Recursively list playable tracks in directory-traversal order.
    ///
    /// No sorting is applied. A missing root yields an empty list; unreadable
    /// entries and non-UTF-8 names are skipped.
    pub fn list(&self) -> Vec<TrackId> {
        let mut tracks = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // The root itself missing is the common case, not worth a warning
                    if e.depth() > 0 {
                        warn!("Skipping unreadable library entry: {}", e);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.has_playable_extension(entry.path()) {
                continue;
            }

            match self.relative_id(entry.path()) {
                Some(id) => tracks.push(id),
                None => warn!("Skipping non UTF-8 path: {}", entry.path().display()),
            }
        }

        debug!("Library scan found {} tracks", tracks.len());
        tracks
    }

    fn relative_id(&self, path: &Path) -> Option<TrackId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(TrackId(parts.join("/")))
    }

    /// Resolve a track identifier to an existing playable file.
    ///
    /// Identifiers that are absolute or step outside the root never resolve.
    pub fn resolve(&self, track: &TrackId) -> Option<PathBuf> {
        let relative = Path::new(track.as_str());
        if track.as_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }

        if !self.has_playable_extension(relative) {
            return None;
        }

        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }

    /// Probed playback length of a track, `None` when unknown.
    ///
    /// Blocking: reads the container headers (and packets when needed).
    pub fn duration(&self, track: &TrackId) -> Option<Duration> {
        let path = self.resolve(track)?;
        match decoder::probe_duration(&path) {
            Ok(duration) => Some(duration),
            Err(e) => {
                debug!("No duration for {}: {}", track, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    fn library_with(files: &[&str]) -> (tempfile::TempDir, LibraryIndex) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"").unwrap();
        }
        let library = LibraryIndex::new(dir.path(), vec!["mp3".into(), "wav".into()]);
        (dir, library)
    }

    #[test]
    fn list_is_recursive_filtered_and_relative() {
        let (_dir, library) = library_with(&[
            "a.mp3",
            "rock/b.MP3",
            "rock/live/c.wav",
            "notes.txt",
            "cover.jpg",
        ]);

        let found: HashSet<String> = library.list().into_iter().map(|t| t.to_string()).collect();
        let expected: HashSet<String> = ["a.mp3", "rock/b.MP3", "rock/live/c.wav"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(found, expected);
    }

    #[test]
    fn list_reflects_filesystem_changes() {
        let (dir, library) = library_with(&["a.mp3"]);
        assert_eq!(library.list().len(), 1);

        fs::write(dir.path().join("b.wav"), b"").unwrap();
        assert_eq!(library.list().len(), 2);

        fs::remove_file(dir.path().join("a.mp3")).unwrap();
        assert_eq!(library.list(), vec![TrackId::from("b.wav")]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let library = LibraryIndex::new("/definitely/not/here", vec!["mp3".into()]);
        assert!(library.list().is_empty());
    }

    #[test]
    fn resolve_requires_existing_playable_file() {
        let (dir, library) = library_with(&["rock/b.mp3", "notes.txt"]);
        fs::create_dir_all(dir.path().join("folder.mp3")).unwrap();

        assert_eq!(
            library.resolve(&TrackId::from("rock/b.mp3")),
            Some(dir.path().join("rock/b.mp3"))
        );
        assert!(library.resolve(&TrackId::from("missing.mp3")).is_none());
        assert!(library.resolve(&TrackId::from("notes.txt")).is_none());
        assert!(library.resolve(&TrackId::from("folder.mp3")).is_none());
        assert!(library.resolve(&TrackId::from("")).is_none());
    }

    #[test]
    fn resolve_rejects_escaping_identifiers() {
        let (dir, library) = library_with(&["rock/b.mp3"]);
        let inner = LibraryIndex::new(dir.path().join("rock"), vec!["mp3".into()]);

        assert!(inner.resolve(&TrackId::from("../rock/b.mp3")).is_none());
        assert!(library.resolve(&TrackId::from("rock/../rock/b.mp3")).is_none());

        let absolute = dir.path().join("rock/b.mp3").to_string_lossy().to_string();
        assert!(library.resolve(&TrackId::from(absolute)).is_none());
    }

    #[test]
    fn extensions_are_normalized() {
        let library = LibraryIndex::new("/tmp", vec![".WAV".into()]);
        assert_eq!(library.extensions(), ["wav"]);
        assert!(library.has_playable_extension(Path::new("x.Wav")));
        assert!(!library.has_playable_extension(Path::new("x.mp3")));
        assert!(!library.has_playable_extension(Path::new("noext")));
    }
}
