//! Run scope resolution: which files are processed and which units in them.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::analysis::{registered_extensions, DocumentableUnit, Language};
use crate::config::RunConfig;

/// Directory names never entered by a workspace walk.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "target",
    "build",
    "dist",
    "__pycache__",
    "venv",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("repository root {0} is not a readable directory")]
    RepoRoot(PathBuf),
    #[error("invalid selection {0:?}, expected <start>:<end> with 1 <= start <= end")]
    MalformedRange(String),
    #[error("a selection requires exactly one file, got {0}")]
    SelectionFileCount(usize),
    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("unsupported file type: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("invalid exclude pattern: {0}")]
    Exclude(String),
}

/// A 1-indexed inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl FromStr for LineRange {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ScopeError::MalformedRange(s.to_string());
        let (start, end) = match s.split_once(':') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (s.trim(), s.trim()),
        };
        let start: usize = start.parse().map_err(|_| malformed())?;
        let end: usize = end.parse().map_err(|_| malformed())?;
        if start == 0 || end < start {
            return Err(malformed());
        }
        Ok(LineRange { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    File,
    Selection,
    Workspace,
}

/// One file's unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub path: PathBuf,
    /// Path relative to the repository root with `/` separators.
    pub file_identity: String,
    pub language: Language,
    pub selection: Option<LineRange>,
}

/// Resolve the configuration into a sorted job list.
pub fn resolve(config: &RunConfig) -> Result<(ScopeMode, Vec<Job>), ScopeError> {
    let root = config
        .repo_root
        .canonicalize()
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| ScopeError::RepoRoot(config.repo_root.clone()))?;

    if let Some(range) = config.selection {
        if config.files.len() != 1 {
            return Err(ScopeError::SelectionFileCount(config.files.len()));
        }
        let mut job = file_job(&root, &config.files[0])?;
        job.selection = Some(range);
        debug!("selection scope {}:{}-{}", job.file_identity, range.start, range.end);
        return Ok((ScopeMode::Selection, vec![job]));
    }

    if !config.files.is_empty() {
        let mut jobs = config
            .files
            .iter()
            .map(|f| file_job(&root, f))
            .collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by(|a, b| a.file_identity.cmp(&b.file_identity));
        jobs.dedup_by(|a, b| a.file_identity == b.file_identity);
        debug!("file scope with {} files", jobs.len());
        return Ok((ScopeMode::File, jobs));
    }

    let excludes = build_excludes(&config.exclude)?;
    let jobs = collect_files(&root, config.max_depth, &excludes)
        .into_iter()
        .filter_map(|path| {
            let language = language_of(&path)?;
            Some(Job {
                file_identity: file_identity(&root, &path),
                path,
                language,
                selection: None,
            })
        })
        .collect::<Vec<_>>();
    debug!("workspace scope with {} files", jobs.len());
    Ok((ScopeMode::Workspace, jobs))
}

fn file_job(root: &Path, file: &Path) -> Result<Job, ScopeError> {
    let path = if file.is_absolute() || !root.join(file).exists() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    let path = path
        .canonicalize()
        .ok()
        .filter(|p| p.is_file())
        .ok_or_else(|| ScopeError::NotAFile(file.to_path_buf()))?;
    let language = language_of(&path).ok_or_else(|| ScopeError::Unsupported(path.clone()))?;
    Ok(Job {
        file_identity: file_identity(root, &path),
        path,
        language,
        selection: None,
    })
}

fn language_of(path: &Path) -> Option<Language> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension)
}

/// Path relative to the root, `/`-separated. Files outside the root keep
/// their full path.
pub fn file_identity(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_excludes(patterns: &[String]) -> Result<GlobSet, ScopeError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScopeError::Exclude(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ScopeError::Exclude(e.to_string()))
}

/// Collect source files under `root`, sorted by path.
fn collect_files(root: &Path, max_depth: usize, excludes: &GlobSet) -> Vec<PathBuf> {
    let extensions = registered_extensions();
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories
            if name.starts_with('.') {
                return false;
            }
            !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.contains(&ext) {
            continue;
        }
        if excludes.is_match(file_identity(root, path)) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    files
}

/// Units whose declaration header overlaps `range`, else the innermost unit
/// containing it.
pub fn select_units(units: Vec<DocumentableUnit>, range: LineRange) -> Vec<DocumentableUnit> {
    let overlapping: Vec<usize> = units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.decl_span.overlaps_lines(range.start, range.end))
        .map(|(i, _)| i)
        .collect();

    let keep: Vec<usize> = if overlapping.is_empty() {
        units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.span.contains_lines(range.start, range.end))
            .min_by_key(|(_, u)| u.span.len())
            .map(|(i, _)| vec![i])
            .unwrap_or_default()
    } else {
        overlapping
    };

    units
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, u)| u)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract;
    use std::fs;

    #[test]
    fn test_parse_line_range() {
        assert_eq!(
            "3:7".parse::<LineRange>().unwrap(),
            LineRange { start: 3, end: 7 }
        );
        assert_eq!(
            "4".parse::<LineRange>().unwrap(),
            LineRange { start: 4, end: 4 }
        );
        assert!("7:3".parse::<LineRange>().is_err());
        assert!("0:2".parse::<LineRange>().is_err());
        assert!("a:b".parse::<LineRange>().is_err());
    }

    #[test]
    fn test_workspace_walk_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/gen")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/b.py"), "def b():\n    pass\n").unwrap();
        fs::write(root.join("src/a.ts"), "function a() {}\n").unwrap();
        fs::write(root.join("src/gen/c.js"), "function c() {}\n").unwrap();
        fs::write(root.join("src/notes.md"), "# notes\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "function d() {}\n").unwrap();
        fs::write(root.join(".git/hook.py"), "x = 1\n").unwrap();

        let mut config = RunConfig::new(root);
        config.exclude = vec!["src/gen/**".to_string()];
        let (mode, jobs) = resolve(&config).unwrap();

        assert_eq!(mode, ScopeMode::Workspace);
        let ids: Vec<&str> = jobs.iter().map(|j| j.file_identity.as_str()).collect();
        assert_eq!(ids, vec!["src/a.ts", "src/b.py"]);
        assert_eq!(jobs[0].language, Language::JavaScriptTypeScript);
    }

    #[test]
    fn test_selection_requires_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunConfig::new(dir.path());
        config.selection = Some(LineRange { start: 1, end: 2 });
        assert_eq!(
            resolve(&config).unwrap_err(),
            ScopeError::SelectionFileCount(0)
        );
    }

    #[test]
    fn test_missing_repo_root() {
        let config = RunConfig::new("/definitely/not/here");
        assert!(matches!(
            resolve(&config).unwrap_err(),
            ScopeError::RepoRoot(_)
        ));
    }

    #[test]
    fn test_select_units() {
        let src = "class A {\n  one() {\n    return 1;\n  }\n\n  two() {\n    return 2;\n  }\n}\n";
        let units = extract(
            Path::new("a.js"),
            src.as_bytes(),
            Language::JavaScriptTypeScript,
        )
        .unwrap();

        let picked = select_units(units.clone(), LineRange { start: 6, end: 6 });
        let names: Vec<&str> = picked.iter().map(|u| u.name_path.as_str()).collect();
        assert_eq!(names, vec!["A.two"]);

        // inside a body: the innermost containing unit
        let picked = select_units(units.clone(), LineRange { start: 3, end: 3 });
        assert_eq!(picked[0].name_path, "A.one");

        let picked = select_units(units, LineRange { start: 5, end: 5 });
        assert_eq!(picked[0].name_path, "A");
    }
}
