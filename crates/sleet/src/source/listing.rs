//! Selection of uncommitted input files.

use std::collections::BTreeSet;

use object_store::path::Path;

/// Files chosen for the next batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PendingFiles {
    /// Up to `max_files` uncommitted files, in filename order. These are the
    /// listed store locations and are read back unchanged.
    pub selected: Vec<Path>,
    /// Uncommitted files left over for later ticks.
    pub remaining: usize,
}

/// File id recorded in the checkpoint for a listed location.
pub fn file_id(path: &Path) -> String {
    path.as_ref().to_string()
}

/// Filter out committed files, sort by name and take the first `max_files`.
pub fn select_pending(
    mut listed: Vec<Path>,
    committed: &BTreeSet<String>,
    max_files: usize,
) -> PendingFiles {
    listed.retain(|path| !committed.contains(path.as_ref()));
    listed.sort();
    listed.dedup();

    let remaining = listed.len().saturating_sub(max_files);
    listed.truncate(max_files);

    PendingFiles {
        selected: listed,
        remaining,
    }
}
