use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use wafermap_parser::SignalDirection;

use crate::assembly::{assemble, ensure_matching_keys, Dataset};
use crate::catalog::{discover, lot_codes, normalize_code};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::inventory::{validate, InventoryReport};
use crate::selection::{select, Selection};

#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub discovery: Duration,
    pub selection: Duration,
    pub validation: Duration,
    pub extraction: Duration,
    pub total: Duration,
}

/// Discovery and selection output for one lot.
#[derive(Debug, Clone)]
pub struct LotScan {
    pub code: String,
    pub discovered: Vec<PathBuf>,
    pub lot_codes: Vec<String>,
    pub selection: Selection,
}

/// Everything the heatmap step needs for one lot.
#[derive(Debug, Clone)]
pub struct LotDatasets {
    pub code: String,
    pub baseline_tx: Dataset,
    pub elevated_tx: Dataset,
    pub elevated_rx: Dataset,
    pub inventory: InventoryReport,
    pub timings: StageTimings,
}

/// Finds the lot's result files and keeps the latest run per probe.
/// A lot with no files is fatal.
pub fn scan_lot(config: &AppConfig, code: &str) -> Result<LotScan> {
    let (code, discovered, lot_codes) = discover_lot(config, code)?;
    let selection = select_runs(&discovered);
    Ok(LotScan {
        code,
        discovered,
        lot_codes,
        selection,
    })
}

fn discover_lot(config: &AppConfig, code: &str) -> Result<(String, Vec<PathBuf>, Vec<String>)> {
    let code = normalize_code(code);
    let root = &config.input_directory;

    let discovered = discover(root, &code, &config.extension)?;
    if discovered.is_empty() {
        return Err(PipelineError::NoMatchingCode {
            code,
            root: root.clone(),
        });
    }
    let lot_codes: Vec<String> = lot_codes(&discovered).into_iter().collect();
    info!(code = %code, files = discovered.len(), lots = ?lot_codes, "result files discovered");
    Ok((code, discovered, lot_codes))
}

fn select_runs(discovered: &[PathBuf]) -> Selection {
    let selection = select(discovered);
    info!(
        baseline = selection.baseline.len(),
        elevated = selection.elevated.len(),
        skipped = selection.skipped.len(),
        "latest runs selected"
    );
    selection
}

/// Runs discovery, selection, coverage validation and extraction for one lot.
pub fn process_lot(config: &AppConfig, code: &str) -> Result<LotDatasets> {
    let started = Instant::now();
    let mut timings = StageTimings::default();

    let stage = Instant::now();
    let (code, discovered, _) = discover_lot(config, code)?;
    timings.discovery = stage.elapsed();

    let stage = Instant::now();
    let selection = select_runs(&discovered);
    timings.selection = stage.elapsed();

    let stage = Instant::now();
    let expected = config.expected_devices();
    let report = validate(&expected, &selection.baseline, &selection.elevated);
    if !report.ok {
        let (baseline, elevated) = report.matched_counts();
        warn!(
            expected = report.expected,
            baseline,
            elevated,
            missing_baseline = ?report.missing_baseline,
            missing_elevated = ?report.missing_elevated,
            "device coverage incomplete"
        );
    }
    let inventory = report.ensure_complete()?;
    timings.validation = stage.elapsed();
    info!(
        baseline = inventory.baseline.len(),
        elevated = inventory.elevated.len(),
        "result files match the device list"
    );

    let stage = Instant::now();
    let baseline_tx = assemble(&inventory.baseline, &config.tx_tests, SignalDirection::Tx)?;
    info!(tables = baseline_tx.len(), "baseline Tx dataset built");
    let elevated_tx = assemble(&inventory.elevated, &config.tx_tests, SignalDirection::Tx)?;
    info!(tables = elevated_tx.len(), "elevated Tx dataset built");
    let elevated_rx = assemble(&inventory.elevated, &config.rx_tests, SignalDirection::Rx)?;
    info!(tables = elevated_rx.len(), "elevated Rx dataset built");
    ensure_matching_keys(&baseline_tx, &elevated_tx)?;
    timings.extraction = stage.elapsed();

    timings.total = started.elapsed();
    info!(
        discovery_ms = timings.discovery.as_millis() as u64,
        selection_ms = timings.selection.as_millis() as u64,
        validation_ms = timings.validation.as_millis() as u64,
        extraction_ms = timings.extraction.as_millis() as u64,
        total_ms = timings.total.as_millis() as u64,
        "lot processed"
    );

    Ok(LotDatasets {
        code,
        baseline_tx,
        elevated_tx,
        elevated_rx,
        inventory,
        timings,
    })
}
