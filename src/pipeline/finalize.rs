//! End-of-run housekeeping: discovery link and fault log copy.

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::path::{Path, PathBuf};

use crate::engine::tools::make_dir_safe;

/// Link path for `outdir` inside `link_dir`: `<link_dir>/<outdir basename>`.
pub fn link_target(outdir: &Path, link_dir: &Path) -> PathBuf {
    let origin = outdir.canonicalize().unwrap_or_else(|_| outdir.to_path_buf());
    let name = origin
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| origin.as_os_str().to_os_string());
    link_dir.join(name)
}

#[cfg(unix)]
fn symlink_dir(origin: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(origin, target)
}

#[cfg(windows)]
fn symlink_dir(origin: &Path, target: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(origin, target)
}

#[cfg(not(any(unix, windows)))]
fn symlink_dir(_origin: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks not supported on this platform",
    ))
}

/// Publish a symlink to the run's output directory under `link_dir`. Never fails the run:
/// problems are logged with the command to do it by hand. Returns the link path when created.
pub fn publish_link(outdir: &Path, link_dir: &Path) -> Option<PathBuf> {
    let origin = outdir.canonicalize().unwrap_or_else(|_| outdir.to_path_buf());
    let target = link_target(outdir, link_dir);
    let result = make_dir_safe(link_dir).and_then(|_| symlink_dir(&origin, &target));
    match result {
        Ok(()) => {
            info!("Symlink to output directory created");
            Some(target)
        }
        Err(e) => {
            error!(
                "Error creating symlink to output in {} ({}), need to perform this manually \
                 for output to work! ln -s {} {}",
                link_dir.display(),
                e,
                origin.display(),
                target.display()
            );
            None
        }
    }
}

/// Copy the fault log into the output directory. A missing log just means nothing was logged.
pub fn persist_fault_log(fault_log: &Path, outdir: &Path) -> Result<()> {
    if !fault_log.is_file() {
        debug!("No fault log at {}; nothing to copy", fault_log.display());
        return Ok(());
    }
    let name = fault_log
        .file_name()
        .context("fault log path has no file name")?;
    let dest = outdir.join(name);
    if fault_log.canonicalize().ok() == dest.canonicalize().ok() {
        return Ok(());
    }
    std::fs::copy(fault_log, &dest).with_context(|| {
        format!(
            "copy fault log {} -> {}",
            fault_log.display(),
            dest.display()
        )
    })?;
    Ok(())
}
