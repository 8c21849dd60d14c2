//! Two-level shard traversal: `base/<l1>/<l2>/<name>`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// `name` must be exactly one normal path component, so lookups stay
/// inside the two-level layout.
pub(crate) fn check_entry_name(name: &str) -> crate::Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(entry)), None) if entry == name => Ok(()),
        _ => Err(crate::StoreError::InvalidName {
            name: name.to_string(),
        }),
    }
}

/// Find `name` directly below any second-level shard directory of `base`.
///
/// Every shard pair is visited; with more than one hit the smallest path
/// wins so the result does not depend on directory iteration order.
pub(crate) fn find_sharded(base: &Path, name: &str) -> io::Result<Option<PathBuf>> {
    if !base.is_dir() {
        return Ok(None);
    }

    let mut matches = Vec::new();

    // Level 1: first shard
    for l1_entry in fs::read_dir(base)? {
        let l1_path = l1_entry?.path();
        if !l1_path.is_dir() {
            continue;
        }

        // Level 2: second shard
        for l2_entry in fs::read_dir(&l1_path)? {
            let l2_path = l2_entry?.path();
            if !l2_path.is_dir() {
                continue;
            }

            // Level 3: the item itself
            let candidate = l2_path.join(name);
            if candidate.exists() {
                matches.push(candidate);
            }
        }
    }

    matches.sort();
    if matches.len() > 1 {
        debug!(
            item = name,
            count = matches.len(),
            chosen = %matches[0].display(),
            "Ambiguous sharded lookup"
        );
    }
    Ok(matches.into_iter().next())
}

/// All entries exactly two shard levels below `base`, sorted by path.
pub(crate) fn list_sharded(base: &Path) -> io::Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    WalkDir::new(base)
        .min_depth(3)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()).map_err(io::Error::from))
        .collect()
}
