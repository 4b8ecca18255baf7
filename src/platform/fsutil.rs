//! Small filesystem utilities for corpus and snippet directories.

use globset::{Glob, GlobSet, GlobSetBuilder};

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{FuzzError, FuzzResult};

/// Files under `root` whose path relative to `root` matches any pattern, sorted.
pub fn find_matching_files(root: &Path, patterns: &[&str]) -> FuzzResult<Vec<PathBuf>> {
    let set = compile_globset(patterns)?;
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            FuzzError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if set.is_match(rel) {
            out.push(entry.path().to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

fn compile_globset(patterns: &[&str]) -> FuzzResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let g = Glob::new(p)
            .map_err(|e| FuzzError::InvalidArgument(format!("invalid glob {p:?}: {e}")))?;
        b.add(g);
    }
    b.build()
        .map_err(|e| FuzzError::InvalidArgument(format!("invalid globset: {e}")))
}

/// `dir/name`, or `dir/stem_N.ext` with the first free `N` when taken.
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|s| s.to_str());
    let mut n = 1u32;
    loop {
        let file = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(file);
        if !candidate.exists() {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}
