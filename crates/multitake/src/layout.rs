//! On-disk project layout.

use std::time::Duration;

use cf_domain::error::Result;

use crate::model::ProjectDirs;

const SOURCE_README: &str = "Files in this directory are never modified.\n\
Clipforge reads takes from here and writes all derived files to temp/, \
output/ and exports/.\n";

const TEMP_GITIGNORE: &str = "*\n!.gitignore\n";

/// Create the five project directories plus their marker files.
pub fn init_directories(dirs: &ProjectDirs) -> Result<()> {
    for dir in [
        &dirs.root,
        &dirs.source,
        &dirs.temp,
        &dirs.output,
        &dirs.exports,
        &dirs.analysis,
    ] {
        std::fs::create_dir_all(dir)?;
    }

    let readme = dirs.source.join("README.md");
    if !readme.exists() {
        std::fs::write(readme, SOURCE_README)?;
    }
    let gitignore = dirs.temp.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(gitignore, TEMP_GITIGNORE)?;
    }
    Ok(())
}

/// Sweep aged files out of `temp/`. The `.gitignore` marker survives
/// because the sweep only removes files older than the cutoff and the
/// marker is rewritten by `init_directories` on the next phase anyway.
pub fn sweep_temp(dirs: &ProjectDirs, max_age_hours: u64) -> Result<usize> {
    cf_media::fsops::sweep_older_than(&dirs.temp, Duration::from_secs(max_age_hours * 3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_layout_with_markers() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = ProjectDirs::under(&tmp.path().join("proj"));
        init_directories(&dirs).unwrap();

        for d in [&dirs.source, &dirs.temp, &dirs.output, &dirs.exports, &dirs.analysis] {
            assert!(d.is_dir());
        }
        let readme = std::fs::read_to_string(dirs.source.join("README.md")).unwrap();
        assert!(readme.contains("never modified"));
        let ignore = std::fs::read_to_string(dirs.temp.join(".gitignore")).unwrap();
        assert_eq!(ignore, "*\n!.gitignore\n");
    }

    #[test]
    fn init_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = ProjectDirs::under(&tmp.path().join("proj"));
        init_directories(&dirs).unwrap();
        std::fs::write(dirs.source.join("README.md"), "user edited").unwrap();
        init_directories(&dirs).unwrap();
        // Existing marker files are left alone.
        assert_eq!(
            std::fs::read_to_string(dirs.source.join("README.md")).unwrap(),
            "user edited"
        );
    }
}
