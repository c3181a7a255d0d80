//! Content digests for items.

use anyhow::{Context, Result};
use blake3::{Hash, Hasher};
use memmap2::Mmap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::utils::config::HashingConsts;

/// blake3 digest of a file's content. Large files are memory-mapped, the rest streamed.
pub fn hash_file(path: &Path) -> Result<Hash> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file.metadata()?.len();
    let mut hasher = Hasher::new();

    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        // SAFETY: read-only mapping, dropped before returning.
        let mmap = unsafe { Mmap::map(&file)? };
        hasher.update(&mmap);
    } else {
        let reader = BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        hasher
            .update_reader(reader)
            .with_context(|| format!("read {}", path.display()))?;
    }
    Ok(hasher.finalize())
}

/// Lowercase hex of a digest, optionally truncated to `len` characters.
pub fn digest_hex(digest: &Hash, len: Option<usize>) -> String {
    let hex = digest.to_hex();
    match len {
        Some(n) if n < hex.len() => hex.as_str()[..n].to_string(),
        _ => hex.to_string(),
    }
}
