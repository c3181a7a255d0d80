//! Path and pattern utilities

use glob::{MatchOptions, Pattern};
use std::io;
use std::path::{Path, PathBuf};

/// Output directory of one item: `<run outdir>/<item basename>`.
pub fn item_outdir(run_outdir: &Path, item: &Path) -> PathBuf {
    match item.file_name() {
        Some(name) => run_outdir.join(name),
        None => run_outdir.join(item.display().to_string().replace(['/', '\\'], "_")),
    }
}

/// Create a directory and its parents; an existing directory is fine.
pub fn make_dir_safe(path: &Path) -> io::Result<()> {
    match std::fs::create_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        other => other,
    }
}

/// Prefix a manifest entry with the base path. A non-empty base path always ends up followed
/// by exactly one separator.
pub fn join_basepath(basepath: &str, entry: &str) -> PathBuf {
    if basepath.is_empty() {
        return PathBuf::from(entry);
    }
    let sep = std::path::MAIN_SEPARATOR;
    if basepath.ends_with(sep) || basepath.ends_with('/') {
        PathBuf::from(format!("{basepath}{entry}"))
    } else {
        PathBuf::from(format!("{basepath}{sep}{entry}"))
    }
}

/// Real path when the file exists, otherwise an absolute, lexically cleaned path.
pub fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Glob options for input patterns: wildcards never cross `/` and never match a leading dot.
pub const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// True if the string contains glob wildcards or a character class.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Match one path component against a glob (`*`, `?`, `[...]`). Hidden names only match a
/// pattern that starts with a literal dot. An invalid pattern matches itself literally.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(text, GLOB_OPTIONS),
        Err(_) => pattern == text,
    }
}
