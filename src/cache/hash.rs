// src/cache/hash.rs

//! Content hashing of cache inputs (lock files, source trees).

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

/// Paths never included in a source-tree hash.
pub const DEFAULT_SOURCE_EXCLUDES: &[&str] = &[".git/**", "target/**", ".shipdag/**", "build/**"];

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute a deterministic hash over the contents of the given files.
///
/// Order of `paths` does not matter; they are sorted before hashing. Each
/// path's name is mixed in with its contents, and paths that are not
/// regular files contribute a marker, so adding or deleting a lock file
/// changes the hash.
pub fn compute_hash_for_paths<I, P>(paths: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut hasher = Hasher::new();

    let mut paths_vec: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    paths_vec.sort();

    for path in paths_vec {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        if path.is_file() {
            debug!("hashing file {:?}", path);
            let file_hash = compute_file_hash(&path)?;
            hasher.update(file_hash.as_bytes());
        } else {
            hasher.update(b"<missing>");
        }
        hasher.update(b"\n");
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, "computed aggregate hash");
    Ok(hash)
}

/// Hash every regular file under `root`, skipping `excludes` (globs relative
/// to `root`). Relative paths are part of the hash, so renames count.
pub fn hash_source_tree(root: &Path, excludes: &[&str]) -> Result<String> {
    let exclude_set = build_globset(excludes)?;
    let mut files = Vec::new();
    collect_files(root, root, &exclude_set, &mut files)?;
    files.sort();

    let mut hasher = Hasher::new();
    for rel in files.iter() {
        let file_hash = compute_file_hash(&root.join(rel))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(file_hash.as_bytes());
        hasher.update(b"\n");
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(root = ?root, files = files.len(), hash = %hash, "computed source tree hash");
    Ok(hash)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob {pattern:?}"))?);
    }
    Ok(builder.build()?)
}

fn collect_files(root: &Path, dir: &Path, excludes: &GlobSet, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
        let path = entry?.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        if excludes.is_match(&rel) {
            continue;
        }
        if path.is_dir() {
            // `dir/**` globs do not match the bare directory itself.
            if excludes.is_match(rel.join("_")) {
                continue;
            }
            collect_files(root, &path, excludes, out)?;
        } else if path.is_file() {
            out.push(rel);
        }
    }
    Ok(())
}
