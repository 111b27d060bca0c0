//! Artifact detector - finds files a task execution produced
//!
//! Three independent passes, unioned by canonicalized path: an explicit
//! `[FILE_GENERATED: path]` marker scan, a scan for absolute workspace paths
//! mentioned in the output, and a directory diff against a pre-execution
//! snapshot (which catches files a tool creates without announcing them).
//! Detection is best-effort: a failing pass is logged and skipped, and zero
//! artifacts is never an execution failure.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::OutputFile;

/// Directories excluded from snapshots and diffs
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", ".venv", "__pycache__"];

/// Explicit artifact marker emitted in task output
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[FILE_GENERATED:\s*([^\]]+)\]").expect("marker pattern"));

/// Candidate absolute path tokens in raw output
static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/[A-Za-z0-9._\-][A-Za-z0-9._/\-]*)").expect("path pattern"));

/// Pre-execution view of a workspace: file path -> modification time
pub type WorkspaceSnapshot = HashMap<PathBuf, SystemTime>;

/// Recursively snapshot the files in a workspace
///
/// Errors walking a subtree are logged and that subtree skipped; the snapshot
/// is advisory input to the diff pass, not a source of truth.
pub fn snapshot(workspace: &Path) -> WorkspaceSnapshot {
    let mut files = WorkspaceSnapshot::new();
    walk(workspace, &mut |path, mtime| {
        files.insert(path.to_path_buf(), mtime);
    });
    debug!(workspace = %workspace.display(), files = files.len(), "Workspace snapshot taken");
    files
}

/// Detect artifacts produced by an execution
pub fn detect(
    output: &str,
    workspace: &Path,
    before: &WorkspaceSnapshot,
    started_at: SystemTime,
) -> Vec<OutputFile> {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    for path in marker_scan(output, workspace) {
        found.insert(canonical(&path));
    }
    for path in path_scan(output, workspace) {
        found.insert(canonical(&path));
    }
    for path in diff_scan(workspace, before, started_at) {
        found.insert(canonical(&path));
    }

    found
        .into_iter()
        .filter_map(|path| match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Some(OutputFile {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: meta.len(),
                human_size: format_size(meta.len()),
                full_path: path,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                None
            }
        })
        .collect()
}

/// Pass 1: explicit `[FILE_GENERATED: path]` markers, existence-verified
pub fn marker_scan(output: &str, workspace: &Path) -> Vec<PathBuf> {
    MARKER_RE
        .captures_iter(output)
        .filter_map(|cap| {
            let raw = cap[1].trim();
            let path = if Path::new(raw).is_absolute() {
                PathBuf::from(raw)
            } else {
                workspace.join(raw)
            };
            path.is_file().then_some(path)
        })
        .collect()
}

/// Pass 2: absolute paths under the workspace mentioned anywhere in output
pub fn path_scan(output: &str, workspace: &Path) -> Vec<PathBuf> {
    PATH_RE
        .find_iter(output)
        .map(|m| PathBuf::from(m.as_str()))
        .filter(|path| path.starts_with(workspace) && path.is_file())
        .collect()
}

/// Pass 3: directory diff against the pre-execution snapshot
///
/// A file absent from the snapshot, or present but modified at/after
/// execution start, counts as new output.
pub fn diff_scan(
    workspace: &Path,
    before: &WorkspaceSnapshot,
    started_at: SystemTime,
) -> Vec<PathBuf> {
    let mut new_files = Vec::new();
    walk(workspace, &mut |path, mtime| {
        let is_new = match before.get(path) {
            None => true,
            Some(_) => mtime >= started_at,
        };
        if is_new {
            new_files.push(path.to_path_buf());
        }
    });
    new_files
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn walk(dir: &Path, visit: &mut impl FnMut(&Path, SystemTime)) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read directory during artifact scan");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            if IGNORED_DIRS.iter().any(|d| name == *d) {
                continue;
            }
            walk(&path, visit);
        } else if path.is_file() {
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            visit(&path, mtime);
        }
    }
}

/// Human-readable byte size
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn diff_pass_finds_unannounced_file() {
        let dir = tempfile::tempdir().unwrap();
        let before = snapshot(dir.path());
        assert!(before.is_empty());

        let started = SystemTime::now() - Duration::from_secs(1);
        fs::write(dir.path().join("report.pdf"), b"%PDF-1.4").unwrap();

        let files = detect("no mention of any file", dir.path(), &before, started);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.pdf");
        assert_eq!(files[0].size, 8);
    }

    #[test]
    fn marker_pass_resolves_relative_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.csv"), b"a,b\n").unwrap();

        let output = format!(
            "done [FILE_GENERATED: out.csv] and [FILE_GENERATED: {}]",
            dir.path().join("out.csv").display()
        );
        let found = marker_scan(&output, dir.path());
        assert_eq!(found.len(), 2);

        // Marker for a nonexistent file is dropped
        let missing = marker_scan("[FILE_GENERATED: ghost.txt]", dir.path());
        assert!(missing.is_empty());
    }

    #[test]
    fn path_pass_only_matches_workspace_paths() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("data.json");
        fs::write(&inside, b"{}").unwrap();

        let output = format!("wrote {} and read /etc/hostname", inside.display());
        let found = path_scan(&output, dir.path());
        assert_eq!(found, vec![inside]);
    }

    #[test]
    fn passes_union_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let before = snapshot(dir.path());
        let started = SystemTime::now() - Duration::from_secs(1);

        let file = dir.path().join("result.txt");
        fs::write(&file, b"hello").unwrap();

        // Announced via marker, via path mention, and visible in the diff
        let output = format!("[FILE_GENERATED: result.txt] saved to {}", file.display());
        let files = detect(&output, dir.path(), &before, started);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].human_size, "5 B");
    }

    #[test]
    fn ignored_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), b"[core]").unwrap();

        let before = snapshot(dir.path());
        assert!(before.is_empty());

        let started = SystemTime::now() - Duration::from_secs(1);
        fs::write(dir.path().join(".git/index"), b"x").unwrap();
        let files = detect("", dir.path(), &before, started);
        assert!(files.is_empty());
    }

    #[test]
    fn preexisting_untouched_files_are_not_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), b"old").unwrap();

        let before = snapshot(dir.path());
        // Execution starts after the old file was written
        let started = SystemTime::now() + Duration::from_secs(5);

        let files = detect("", dir.path(), &before, started);
        assert!(files.is_empty());
    }
}
