//! Per-process transcript cache.
//!
//! Keyed by (path, size, mtime) so an edited file invalidates its entry.
//! Backs `find_in_transcript` and `replace_word`, which would otherwise
//! re-upload the same audio several times in one conversation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

use cf_domain::error::Result;
use cf_domain::transcript::Transcript;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    size: u64,
    mtime: Option<SystemTime>,
}

impl CacheKey {
    fn for_path(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime: meta.modified().ok(),
        })
    }
}

#[derive(Default)]
pub struct TranscriptCache {
    entries: Mutex<HashMap<CacheKey, Transcript>>,
}

impl TranscriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Transcript> {
        let key = CacheKey::for_path(path).ok()?;
        self.entries.lock().get(&key).cloned()
    }

    pub fn put(&self, path: &Path, transcript: Transcript) {
        if let Ok(key) = CacheKey::for_path(path) {
            self.entries.lock().insert(key, transcript);
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::transcript::Segment;

    fn transcript() -> Transcript {
        Transcript {
            text: "hello".into(),
            segments: vec![Segment {
                text: "hello".into(),
                start: 0.0,
                end: 1.0,
                words: vec![],
            }],
            duration: 1.0,
            language: "en".into(),
        }
    }

    #[test]
    fn hit_after_put_miss_after_modification() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"original").unwrap();

        let cache = TranscriptCache::new();
        assert!(cache.get(&file).is_none());
        cache.put(&file, transcript());
        assert!(cache.get(&file).is_some());

        // Change the file size; the old key no longer matches.
        std::fs::write(&file, b"modified content").unwrap();
        assert!(cache.get(&file).is_none());
    }
}
