//! Relative-path layout inside a session directory.
//!
//! Every file backed up for a config is stored under the session directory at
//! its path relative to one fixed base: the deepest common ancestor of all
//! configured source paths. A single base keeps multi-root configs from
//! colliding and keeps relative paths stable across runs.

use std::path::{Component, Path, PathBuf};

/// Deepest common ancestor of the source paths. File sources contribute
/// their parent directory, so a config of a single file maps that file
/// directly into the session root.
pub fn backup_root(sources: &[PathBuf]) -> Option<PathBuf> {
    let mut dirs = sources.iter().map(|p| {
        if p.is_file() {
            p.parent().map(Path::to_path_buf).unwrap_or_else(|| p.clone())
        } else {
            p.clone()
        }
    });

    let first = dirs.next()?;
    let mut ancestor = first;
    for dir in dirs {
        ancestor = common_prefix(&ancestor, &dir);
    }
    Some(ancestor)
}

fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for (ca, cb) in a.components().zip(b.components()) {
        if ca != cb {
            break;
        }
        prefix.push(ca.as_os_str());
    }
    prefix
}

/// Destination for `file` relative to the backup root, sanitized for use
/// under the session directory: drive prefixes and root markers are stripped
/// and only normal components are kept. Returns `None` for files outside the
/// root or paths that would escape it; callers log and skip those.
pub fn session_relative(root: &Path, file: &Path) -> Option<PathBuf> {
    let relative = file.strip_prefix(root).ok()?;

    let mut out = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => return None,
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_backup_root_of_single_file_is_its_parent() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"hello")?;

        let root = backup_root(&[file.clone()]).unwrap();
        assert_eq!(root, temp_dir.path());
        assert_eq!(
            session_relative(&root, &file).unwrap(),
            PathBuf::from("a.txt")
        );
        Ok(())
    }

    #[test]
    fn test_backup_root_of_multiple_sources() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let docs = temp_dir.path().join("docs");
        let media = temp_dir.path().join("media");
        fs::create_dir_all(&docs)?;
        fs::create_dir_all(&media)?;

        let root = backup_root(&[docs.clone(), media.clone()]).unwrap();
        assert_eq!(root, temp_dir.path());

        let file = docs.join("notes/today.md");
        assert_eq!(
            session_relative(&root, &file).unwrap(),
            PathBuf::from("docs/notes/today.md")
        );
        Ok(())
    }

    #[test]
    fn test_session_relative_rejects_files_outside_root() {
        assert_eq!(
            session_relative(Path::new("/data/docs"), Path::new("/data/other/x.txt")),
            None
        );
    }

    #[test]
    fn test_session_relative_rejects_escaping_paths() {
        assert_eq!(
            session_relative(Path::new("/data"), Path::new("/data/../etc/passwd")),
            None
        );
    }
}
