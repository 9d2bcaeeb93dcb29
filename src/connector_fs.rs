use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use tracing::warn;

/// Decides which filenames in the watched directory are documents.
///
/// Names starting with `.` or `~` (editor swap files, lock files, hidden
/// files) are always ignored; `exclude_globs` adds to that.
#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude: GlobSet,
}

impl FileFilter {
    pub fn new(exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            exclude: build_globset(exclude_globs)?,
        })
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        name.is_empty()
            || name.starts_with('.')
            || name.starts_with('~')
            || self.exclude.is_match(name)
    }
}

/// Record id for a file: its name within the watched directory.
pub fn doc_id_for(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// List the regular files directly inside `dir`, skipping ignored names.
///
/// Creates `dir` if it does not exist yet. Subdirectories are not
/// descended into.
pub fn scan_directory(dir: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        bail!("watch dir is not a directory: {}", dir.display());
    }

    let mut files = Vec::new();

    // Symlinked files count as documents; a dangling link is skipped.
    for entry in WalkDir::new(dir).follow_links(true).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        match doc_id_for(path) {
            Some(name) if !filter.is_ignored(&name) => files.push(path.to_path_buf()),
            _ => continue,
        }
    }

    // Sort for deterministic ordering
    files.sort();

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_filter_ignores_transient_names() {
        let filter = FileFilter::new(&["*.tmp".to_string()]).unwrap();
        assert!(filter.is_ignored(".DS_Store"));
        assert!(filter.is_ignored("~$notice.docx"));
        assert!(filter.is_ignored("upload.tmp"));
        assert!(!filter.is_ignored("circular-12.pdf"));
    }

    #[test]
    fn test_scan_lists_top_level_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join(".hidden"), "h").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("c.txt"), "c").unwrap();

        let filter = FileFilter::new(&[]).unwrap();
        let files = scan_directory(tmp.path(), &filter).unwrap();
        let names: Vec<String> = files.iter().filter_map(|p| doc_id_for(p)).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinked_files() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let outside = tmp.path().join("circular-12.txt");
        fs::write(&outside, "ITC circular").unwrap();
        std::os::unix::fs::symlink(&outside, docs.join("circular-12.txt")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), docs.join("dangling.txt")).unwrap();
        fs::write(docs.join("local.txt"), "local").unwrap();

        let filter = FileFilter::new(&[]).unwrap();
        let files = scan_directory(&docs, &filter).unwrap();
        let names: Vec<String> = files.iter().filter_map(|p| doc_id_for(p)).collect();
        assert_eq!(names, vec!["circular-12.txt", "local.txt"]);
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "ITC circular");
    }

    #[test]
    fn test_scan_creates_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("gst_docs");
        let filter = FileFilter::new(&[]).unwrap();
        assert!(scan_directory(&dir, &filter).unwrap().is_empty());
        assert!(dir.is_dir());
    }
}
