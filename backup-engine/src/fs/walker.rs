//! Source path enumeration for backup runs.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand the configured source paths into a flat list of regular files.
///
/// Regular files are included directly; directories are walked depth-first
/// with entries sorted lexicographically per directory, so the result is
/// deterministic for a given tree. Symlinks are followed as their target
/// type. A missing or unreadable entry is logged and skipped; it never aborts
/// enumeration of the remaining paths.
pub fn enumerate(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipped unreadable source path");
                continue;
            }
        };

        if meta.is_file() {
            files.push(path.clone());
            continue;
        }

        walk_directory(path, &mut files);
    }

    files
}

fn walk_directory(root: &Path, files: &mut Vec<PathBuf>) {
    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Skipped unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_enumerate_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = enumerate(&[temp_dir.path().to_path_buf()]);
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_enumerate_mixed_files_and_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;
        let lone = temp_dir.path().join("lone.txt");
        fs::write(&lone, b"lone")?;

        let files = enumerate(&[temp_dir.path().to_path_buf(), lone.clone()]);
        // lone.txt appears twice: once under the directory, once as a direct source
        assert_eq!(files.len(), 4);
        assert!(files.contains(&lone));
        Ok(())
    }

    #[test]
    fn test_enumerate_skips_missing_path() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("keep.txt"), b"keep")?;

        let files = enumerate(&[
            temp_dir.path().join("does-not-exist"),
            temp_dir.path().to_path_buf(),
        ]);
        assert_eq!(files.len(), 1);
        Ok(())
    }

    #[test]
    fn test_enumerate_is_deterministic() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for name in ["b.txt", "a.txt", "c.txt"] {
            fs::write(temp_dir.path().join(name), b"x")?;
        }

        let first = enumerate(&[temp_dir.path().to_path_buf()]);
        let second = enumerate(&[temp_dir.path().to_path_buf()]);
        assert_eq!(first, second);

        let names: Vec<String> = first
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
        Ok(())
    }
}
