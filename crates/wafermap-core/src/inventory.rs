use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::naming::ResultFile;

/// Coverage of the expected device list by the selected runs.
#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub ok: bool,
    pub expected: usize,
    pub baseline: Vec<ResultFile>,
    pub elevated: Vec<ResultFile>,
    pub missing_baseline: Vec<String>,
    pub missing_elevated: Vec<String>,
}

impl InventoryReport {
    pub fn matched_counts(&self) -> (usize, usize) {
        (self.baseline.len(), self.elevated.len())
    }

    /// Incomplete coverage leaves nothing to compare, so it is fatal.
    pub fn ensure_complete(self) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        Err(PipelineError::Coverage {
            expected: self.expected,
            baseline: self.baseline.len(),
            elevated: self.elevated.len(),
            missing_baseline: self.missing_baseline,
            missing_elevated: self.missing_elevated,
        })
    }
}

/// Keeps only files whose device code is expected; coverage holds when both
/// conditions matched exactly as many files as there are expected devices.
pub fn validate(
    expected: &BTreeSet<String>,
    baseline: &[ResultFile],
    elevated: &[ResultFile],
) -> InventoryReport {
    let baseline = filter_expected(expected, baseline);
    let elevated = filter_expected(expected, elevated);
    let ok = baseline.len() == expected.len() && elevated.len() == expected.len();

    InventoryReport {
        ok,
        expected: expected.len(),
        missing_baseline: missing_devices(expected, &baseline),
        missing_elevated: missing_devices(expected, &elevated),
        baseline,
        elevated,
    }
}

fn filter_expected(expected: &BTreeSet<String>, files: &[ResultFile]) -> Vec<ResultFile> {
    files
        .iter()
        .filter(|file| {
            let keep = expected.contains(file.device_code.as_str());
            if !keep {
                debug!(
                    path = %file.path.display(),
                    device = %file.device_code,
                    "device not in expected list"
                );
            }
            keep
        })
        .cloned()
        .collect()
}

fn missing_devices(expected: &BTreeSet<String>, files: &[ResultFile]) -> Vec<String> {
    let present: HashSet<&str> = files.iter().map(|file| file.device_code.as_str()).collect();
    expected
        .iter()
        .filter(|device| !present.contains(device.as_str()))
        .cloned()
        .collect()
}
