use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::naming::{Condition, ProbeIdentity, ResultFile, RunTimestamp};

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Latest run per probe identity, split by condition.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub baseline: Vec<ResultFile>,
    pub elevated: Vec<ResultFile>,
    pub skipped: Vec<SkippedFile>,
}

impl Selection {
    pub fn files(&self, condition: Condition) -> &[ResultFile] {
        match condition {
            Condition::Baseline => &self.baseline,
            Condition::Elevated => &self.elevated,
        }
    }
}

/// Parses each path's name and keeps the most recent run per probe identity.
///
/// Names that cannot be parsed are reported in `skipped` rather than failing
/// the batch.
pub fn select<P: AsRef<Path>>(paths: &[P]) -> Selection {
    let mut files = Vec::with_capacity(paths.len());
    let mut skipped = Vec::new();

    for path in paths {
        let path = path.as_ref();
        match ResultFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "dropping result file");
                skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut selection = select_latest(files);
    selection.skipped.extend(skipped);
    selection
}

/// Groups files by probe identity and keeps the latest timestamp of each
/// group. Unparsed timestamps rank oldest; equal timestamps resolve to the
/// lexicographically smallest path. Output follows the first appearance of
/// each probe identity.
pub fn select_latest(files: Vec<ResultFile>) -> Selection {
    let mut order: Vec<ProbeIdentity> = Vec::new();
    let mut latest: HashMap<ProbeIdentity, ResultFile> = HashMap::new();

    for file in files {
        if let RunTimestamp::Unparsed { token, reason } = &file.timestamp {
            warn!(
                path = %file.path.display(),
                token = %token,
                reason = %reason,
                "unparsable run timestamp; treating as oldest"
            );
        }

        match latest.get_mut(&file.probe_identity) {
            Some(current) => {
                if is_newer(&file, current) {
                    debug!(
                        probe = %file.probe_identity,
                        replaced = %current.path.display(),
                        "newer run found"
                    );
                    *current = file;
                }
            }
            None => {
                order.push(file.probe_identity.clone());
                latest.insert(file.probe_identity.clone(), file);
            }
        }
    }

    let mut selection = Selection::default();
    for probe in order {
        let Some(file) = latest.remove(&probe) else {
            continue;
        };
        match file.condition {
            Condition::Baseline => selection.baseline.push(file),
            Condition::Elevated => selection.elevated.push(file),
        }
    }
    selection
}

fn is_newer(candidate: &ResultFile, current: &ResultFile) -> bool {
    match candidate.timestamp.recency_cmp(&current.timestamp) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.path < current.path,
    }
}
