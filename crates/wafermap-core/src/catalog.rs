use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::error::Result;
use crate::naming::Condition;

pub const DEFAULT_EXTENSION: &str = "xml";

const ABORTED_TOKEN: &str = "ABORTED";
const LOT_CODE_LEN: usize = 6;

/// Recursively finds baseline and elevated result files for a lot code.
///
/// A file qualifies when its name starts with `code` (case-insensitive),
/// contains one of the condition markers and carries `extension`. Paths
/// containing `ABORTED` anywhere are never returned. An empty result is not an
/// error; the caller decides whether a lot without files is fatal.
pub fn discover(root: &Path, code: &str, extension: &str) -> Result<Vec<PathBuf>> {
    let code = normalize_code(code);
    let extension = extension.trim_start_matches('.');
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let root_pattern = Pattern::escape(&root.to_string_lossy());
    let code_pattern = Pattern::escape(&code);
    let mut found = BTreeSet::new();

    for condition in [Condition::Baseline, Condition::Elevated] {
        let marker = condition.marker();
        let pattern = format!("{root_pattern}/**/{code_pattern}*{marker}*.{extension}");
        for entry in glob::glob_with(&pattern, options)? {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(error = %err, "could not read path while scanning");
                    continue;
                }
            };
            if is_aborted(&path) {
                debug!(path = %path.display(), "skipping aborted run");
                continue;
            }
            if path.is_file() {
                found.insert(path);
            }
        }
    }

    Ok(found.into_iter().collect())
}

/// Lot codes are compared trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_aborted(path: &Path) -> bool {
    path.to_string_lossy().to_uppercase().contains(ABORTED_TOKEN)
}

/// Distinct lot prefixes among the discovered files: the first six characters
/// of the device token, cut at the first underscore.
pub fn lot_codes<P: AsRef<Path>>(files: &[P]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|path| path.as_ref().file_name())
        .map(|name| {
            let name = name.to_string_lossy();
            let token = name.split('-').next().unwrap_or_default();
            let base = token.split('_').next().unwrap_or_default();
            base.chars().take(LOT_CODE_LEN).collect::<String>().to_uppercase()
        })
        .filter(|code| !code.is_empty())
        .collect()
}
