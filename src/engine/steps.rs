//! Built-in loader and steps, so a plain `batchqc` binary has something to run.
//!
//! These work on any file. Real analysis modules register their own steps through
//! [`StepRegistry`].

use anyhow::{Context, Result, bail};
use log::debug;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use super::hashing::{digest_hex, hash_file};
use super::registry::{StepParams, StepRegistry};
use crate::ItemState;
use crate::utils::config::ConfigSections;

pub const BASIC_STATS: &str = "BasicModule.getBasicStats";
pub const BLAKE3_DIGEST: &str = "HashModule.blake3Digest";
pub const FLAG_DUPLICATES: &str = "DuplicateModule.flagDuplicates";

/// Output field written by [`blake3_digest`] and read by [`flag_duplicates`].
const DIGEST_FIELD: &str = "blake3";

pub fn register_builtins(registry: &mut StepRegistry) {
    registry
        .register_loader(ConfigSections::LOADER, load_file)
        .register_step(BASIC_STATS, basic_stats)
        .register_step(BLAKE3_DIGEST, blake3_digest)
        .register_step(FLAG_DUPLICATES, flag_duplicates);
}

/// Open the file and keep it as the item's resource handle.
///
/// Parameters: `extensions` (comma-separated, case-insensitive) rejects other file types.
pub fn load_file(
    path: &Path,
    outdir: &Path,
    params: &BTreeMap<String, String>,
) -> Result<ItemState> {
    if let Some(allowed) = params.get("extensions") {
        let ext = extension_of(path);
        let ok = allowed
            .split(',')
            .map(|e| e.trim().trim_start_matches('.'))
            .any(|e| e.eq_ignore_ascii_case(&ext));
        if !ok {
            bail!("unsupported file type {:?} (allowed: {})", ext, allowed);
        }
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    if !file.metadata()?.is_file() {
        bail!("not a regular file");
    }
    let mut state = ItemState::new(path, outdir);
    state.set_output("filename", state.file_name());
    state.set_output("outdir", outdir.display());
    state.set_handle(file);
    Ok(state)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Size, extension and modification time. Warns on empty files.
pub fn basic_stats(state: &mut ItemState, _params: &StepParams) -> Result<()> {
    let meta = match state.handle::<File>() {
        Some(file) => file.metadata()?,
        None => std::fs::metadata(&state.path)?,
    };
    let mtime = meta
        .modified()
        .map(|t| {
            chrono::DateTime::<chrono::Local>::from(t)
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| "NA".to_string());
    if meta.len() == 0 {
        state.warn("empty file");
    }
    let ext = extension_of(&state.path);
    state.set_output("file_size", meta.len());
    state.set_output("extension", ext);
    state.set_output("mtime", mtime);
    Ok(())
}

/// Content digest. Parameters: `length` truncates the hex digest.
pub fn blake3_digest(state: &mut ItemState, params: &StepParams) -> Result<()> {
    let length = params.parse::<usize>("length")?;
    let digest = hash_file(&state.path)?;
    state.set_output(DIGEST_FIELD, digest_hex(&digest, length));
    Ok(())
}

/// Record each digest in the shared map and flag items whose content was already seen.
/// Needs [`blake3_digest`] earlier in the pipeline. Parameters: `key_prefix` (default `digest:`).
pub fn flag_duplicates(state: &mut ItemState, params: &StepParams) -> Result<()> {
    let Some(digest) = state.output(DIGEST_FIELD).map(str::to_string) else {
        bail!("no `{DIGEST_FIELD}` output; run {BLAKE3_DIGEST} before {FLAG_DUPLICATES}");
    };
    let key = format!("{}{}", params.get_or("key_prefix", "digest:"), digest);
    let me = state.path.display().to_string();

    let shared = params.shared();
    let first_seen = {
        let _guard = shared.lock();
        match shared.get(&key) {
            Some(seen) => seen.as_str().map(str::to_string),
            None => {
                shared.insert(key.clone(), json!(me));
                None
            }
        }
    };

    match first_seen {
        Some(other) if other != me => {
            debug!("{} duplicates {}", me, other);
            state.warn(format!("duplicate content of {other}"));
            state.set_output("duplicate_of", other);
        }
        _ => state.set_output("duplicate_of", "NA"),
    }
    Ok(())
}
