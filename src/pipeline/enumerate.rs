//! Expand the positional input into the ordered, deduplicated list of item paths.

use anyhow::{Context, Result};
use glob::Pattern;
use log::debug;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::engine::tools::{GLOB_OPTIONS, absolutize, has_glob_meta, join_basepath};
use crate::error::RunError;
use crate::utils::config::ReportConsts;

/// The three accepted shapes of input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSpec {
    /// Two or more paths, usually expanded by the shell.
    Paths(Vec<PathBuf>),
    /// A tab-separated file listing one item per line in its first column.
    Manifest(PathBuf),
    /// A single glob pattern.
    Pattern(String),
}

impl InputSpec {
    pub fn from_args(inputs: &[String]) -> Result<Self, RunError> {
        match inputs {
            [] => Err(RunError::Usage("no input files given".to_string())),
            [single] if single.ends_with(ReportConsts::EXTENSION) => {
                Ok(InputSpec::Manifest(PathBuf::from(single)))
            }
            [single] => Ok(InputSpec::Pattern(single.clone())),
            many => Ok(InputSpec::Paths(many.iter().map(PathBuf::from).collect())),
        }
    }
}

/// Manifest entries: first tab-separated column of every non-comment, non-blank line,
/// prefixed with `basepath`.
pub fn parse_manifest(content: &str, basepath: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.trim().split('\t').next())
        .filter(|first| !first.is_empty())
        .map(|first| join_basepath(basepath, first))
        .collect()
}

/// Expand a glob pattern (`*`, `?`, `[...]` within one path component). Hidden entries need a
/// literal leading dot. Matches are sorted.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let invalid = |e: glob::PatternError| {
        RunError::Usage(format!("invalid glob pattern {pattern:?}: {e}"))
    };
    let mut base = PathBuf::new();
    let mut rest: Vec<Pattern> = Vec::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        match component {
            Component::Normal(_) if rest.is_empty() && !has_glob_meta(&text) => {
                base.push(component)
            }
            Component::Normal(_) => rest.push(Pattern::new(&text).map_err(invalid)?),
            _ if rest.is_empty() => base.push(component),
            _ => rest.push(Pattern::new(&Pattern::escape(&text)).map_err(invalid)?),
        }
    }

    if rest.is_empty() {
        return Ok(if base.exists() { vec![base] } else { Vec::new() });
    }
    let root = if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    };
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let depth = rest.len();
    let mut matches = Vec::new();
    for entry in WalkDir::new(&root).min_depth(depth).max_depth(depth) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!("glob: skipping unreadable path: {}", err);
                continue;
            }
        };
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let is_match = rel
            .components()
            .zip(rest.iter())
            .all(|(c, p)| p.matches_with(&c.as_os_str().to_string_lossy(), GLOB_OPTIONS));
        if is_match {
            matches.push(entry.into_path());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Absolute paths in first-seen order, duplicates dropped.
pub fn dedup_absolute(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .map(|p| absolutize(&p))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Enumerate items for `spec`. Fails with [`RunError::Usage`] when nothing is found.
pub fn enumerate_items(spec: &InputSpec, basepath: &str) -> Result<Vec<PathBuf>> {
    let raw = match spec {
        InputSpec::Paths(paths) => paths.clone(),
        InputSpec::Manifest(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read manifest {}", path.display()))?;
            parse_manifest(&content, basepath)
        }
        InputSpec::Pattern(pattern) => expand_glob(&format!("{basepath}{pattern}"))?,
    };
    let items = dedup_absolute(raw);
    if items.is_empty() {
        return Err(RunError::Usage(format!("no items found for input {spec:?}")).into());
    }
    Ok(items)
}
