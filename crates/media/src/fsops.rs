//! Filesystem safety rules shared by every tool.
//!
//! Two invariants are enforced here rather than per-tool: source files are
//! never opened for writing, and outputs only ever appear as complete files
//! (written to a dot-prefixed temp sibling, renamed into place on success,
//! deleted on failure or cancellation via the staging guard's `Drop`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use cf_domain::error::{Error, Result};

/// Validate that a path exists and is a readable file, distinguishing the
/// two failure kinds.
pub fn require_readable(path: &Path) -> Result<()> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(Error::FileNotAccessible {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    if !meta.is_file() {
        return Err(Error::FileNotAccessible {
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        });
    }
    fs::File::open(path).map_err(|e| Error::FileNotAccessible {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Fail before touching the filesystem when a tool is asked to write its
/// output over its own input.
pub fn reject_in_place(input: &Path, output: &Path) -> Result<()> {
    let same = match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        // Output usually does not exist yet; fall back to lexical equality.
        _ => input == output,
    };
    if same {
        return Err(Error::SchemaViolation(format!(
            "output path equals input path: {}",
            input.display()
        )));
    }
    Ok(())
}

/// A staged output file: tools write to `path()`, then call `commit()`.
/// Dropping an uncommitted stage removes the temp file, which covers both
/// error returns and cancellation unwinds.
pub struct StagedOutput {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn new(target: &Path) -> Result<Self> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let name = target
            .file_name()
            .ok_or_else(|| Error::SchemaViolation(format!("not a file path: {}", target.display())))?;
        let temp = dir.join(format!(
            ".{}.{}.tmp",
            name.to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        ));
        Ok(Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    /// Where the tool (or ffmpeg) should write.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Rename the temp file into place. Fails when nothing was written.
    pub fn commit(mut self) -> Result<PathBuf> {
        if !self.temp.exists() {
            return Err(Error::Other(format!(
                "staged output was never written: {}",
                self.target.display()
            )));
        }
        fs::rename(&self.temp, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed && self.temp.exists() {
            if let Err(e) = fs::remove_file(&self.temp) {
                tracing::warn!(path = %self.temp.display(), error = %e, "failed to remove staged temp");
            }
        }
    }
}

/// Pick a destination in `dir` for `file_name`, appending `_N` before the
/// extension until the name is unused.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (file_name.to_string(), String::new()),
    };
    for n in 1.. {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// Delete regular files in `dir` older than `max_age`. Returns how many
/// were removed. Subdirectories and unreadable entries are skipped.
pub fn sweep_older_than(dir: &Path, max_age: Duration) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if now.duration_since(modified).unwrap_or_default() > max_age {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_readable_distinguishes_missing_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");
        assert!(matches!(
            require_readable(&missing),
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            require_readable(dir.path()),
            Err(Error::FileNotAccessible { .. })
        ));
    }

    #[test]
    fn reject_in_place_catches_lexical_equality() {
        let p = Path::new("/tmp/out.mp4");
        assert!(reject_in_place(p, p).is_err());
        assert!(reject_in_place(Path::new("/tmp/a.mp4"), Path::new("/tmp/b.mp4")).is_ok());
    }

    #[test]
    fn staged_output_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let stage = StagedOutput::new(&target).unwrap();
        fs::write(stage.path(), b"data").unwrap();
        assert!(!target.exists());
        let committed = stage.commit().unwrap();
        assert_eq!(committed, target);
        assert_eq!(fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn dropped_stage_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let temp_path;
        {
            let stage = StagedOutput::new(&target).unwrap();
            fs::write(stage.path(), b"partial").unwrap();
            temp_path = stage.path().to_path_buf();
        }
        assert!(!temp_path.exists());
        assert!(!target.exists());
    }

    #[test]
    fn unique_destination_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("take.mp4"), b"x").unwrap();
        fs::write(dir.path().join("take_1.mp4"), b"x").unwrap();
        let dest = unique_destination(dir.path(), "take.mp4");
        assert_eq!(dest.file_name().unwrap(), "take_2.mp4");
    }

    #[test]
    fn sweep_ignores_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fresh.tmp"), b"x").unwrap();
        let removed = sweep_older_than(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 0);
        assert!(dir.path().join("fresh.tmp").exists());
    }
}
