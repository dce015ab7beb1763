//! Per-die data preparation for wafer heatmaps. Rendering happens elsewhere;
//! this module only turns element vectors into normalized grids and places
//! dies on the wafer layout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::assembly::MeasurementTable;
use crate::error::{PipelineError, Result};

/// Element layout of a single die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub columns: usize,
}

impl GridShape {
    pub fn len(&self) -> usize {
        self.rows * self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self {
            rows: 40,
            columns: 75,
        }
    }
}

/// Die position on the wafer, written `RRR_CCC` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DieLocation {
    pub row: u32,
    pub column: u32,
}

impl FromStr for DieLocation {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (row, column) = value
            .trim()
            .split_once('_')
            .ok_or_else(|| format!("die location '{value}' is not in RRR_CCC form"))?;
        let row = row
            .parse::<u32>()
            .map_err(|err| format!("die location '{value}' has invalid row: {err}"))?;
        let column = column
            .parse::<u32>()
            .map_err(|err| format!("die location '{value}' has invalid column: {err}"))?;
        Ok(Self { row, column })
    }
}

impl fmt::Display for DieLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{:03}", self.row, self.column)
    }
}

/// Wafer grid of dies. Row 1 is drawn at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaferLayout {
    pub rows: u32,
    pub columns: u32,
}

impl Default for WaferLayout {
    fn default() -> Self {
        Self {
            rows: 9,
            columns: 13,
        }
    }
}

impl WaferLayout {
    /// Zero-based (grid row, grid column) of a die, or `None` when it falls
    /// outside the wafer.
    pub fn cell(&self, die: DieLocation) -> Option<(usize, usize)> {
        if die.row == 0 || die.row > self.rows || die.column == 0 || die.column > self.columns {
            return None;
        }
        Some(((self.rows - die.row) as usize, (die.column - 1) as usize))
    }
}

/// Reshapes an element vector row-major into `shape`, divides by the mean and
/// rotates the result 90° counter-clockwise (`columns × rows` out).
pub fn die_grid(values: &[Option<f64>], shape: GridShape) -> Result<Vec<Vec<f64>>> {
    if values.len() != shape.len() {
        return Err(PipelineError::Grid(format!(
            "expected {} elements for a {}x{} die, found {}",
            shape.len(),
            shape.rows,
            shape.columns,
            values.len()
        )));
    }
    let elements = values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            value.ok_or_else(|| PipelineError::Grid(format!("element {idx} has no value")))
        })
        .collect::<Result<Vec<f64>>>()?;

    let mean = elements.iter().sum::<f64>() / elements.len() as f64;
    if !mean.is_finite() || mean == 0.0 {
        return Err(PipelineError::Grid(format!(
            "cannot normalize by mean {mean}"
        )));
    }

    let rotated = (0..shape.columns)
        .map(|out_row| {
            let source_column = shape.columns - 1 - out_row;
            (0..shape.rows)
                .map(|source_row| elements[source_row * shape.columns + source_column] / mean)
                .collect()
        })
        .collect();
    Ok(rotated)
}

/// Summary of one die under both conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct DieComparison {
    pub serial: String,
    pub location: Option<DieLocation>,
    pub baseline_mean: Option<f64>,
    pub elevated_mean: Option<f64>,
}

impl DieComparison {
    /// Elevated mean relative to baseline.
    pub fn ratio(&self) -> Option<f64> {
        match (self.baseline_mean, self.elevated_mean) {
            (Some(base), Some(hot)) if base != 0.0 => Some(hot / base),
            _ => None,
        }
    }
}

/// Per-die element means for every serial present in either table.
pub fn compare_conditions(
    baseline: &MeasurementTable,
    elevated: &MeasurementTable,
) -> Result<Vec<DieComparison>> {
    let mut serials: Vec<&String> = baseline.serials().iter().chain(elevated.serials()).collect();
    serials.sort();
    serials.dedup();

    serials
        .into_iter()
        .map(|serial| {
            Ok(DieComparison {
                serial: serial.clone(),
                location: serial.parse().ok(),
                baseline_mean: element_mean(baseline, serial)?,
                elevated_mean: element_mean(elevated, serial)?,
            })
        })
        .collect()
}

fn element_mean(table: &MeasurementTable, serial: &str) -> Result<Option<f64>> {
    let Some(values) = table.element_vector(serial)? else {
        return Ok(None);
    };
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return Ok(None);
    }
    Ok(Some(present.iter().sum::<f64>() / present.len() as f64))
}
