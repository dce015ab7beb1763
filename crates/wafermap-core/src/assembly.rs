use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use tracing::{info, warn};
use wafermap_parser::{extract_report, DeviceRecord, SignalDirection, TestSpec};

use crate::error::{PipelineError, Result};

pub const SERIAL_COLUMN: &str = "Serial";

/// One row per die, sorted by serial. Text columns precede the numeric
/// measurement columns, and the first measurement column is `Element[0]` of
/// the extracted direction.
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    df: DataFrame,
    text_columns: Vec<String>,
    measurement_columns: Vec<String>,
    serials: Vec<String>,
}

impl MeasurementTable {
    /// Builds a table from extracted records.
    ///
    /// Columns are the union of every record's columns in first-seen order; a
    /// record that lacks a column contributes a null there.
    pub fn from_records(
        key: &str,
        mut records: Vec<DeviceRecord>,
    ) -> Result<Self> {
        records.sort_by(|a, b| a.serial.cmp(&b.serial));
        if let Some(pair) = records.windows(2).find(|pair| pair[0].serial == pair[1].serial) {
            return Err(PipelineError::DuplicateSerial {
                key: key.to_string(),
                serial: pair[0].serial.to_string(),
            });
        }

        let builder = records
            .into_iter()
            .fold(TableBuilder::default(), |mut builder, record| {
                builder.push(record);
                builder
            });
        builder.finish()
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn serials(&self) -> &[String] {
        &self.serials
    }

    pub fn text_columns(&self) -> &[String] {
        &self.text_columns
    }

    pub fn measurement_columns(&self) -> &[String] {
        &self.measurement_columns
    }

    pub fn text_value(&self, serial: &str, column: &str) -> Result<Option<String>> {
        let Some(row) = self.row_index(serial) else {
            return Ok(None);
        };
        let values = self.df.column(column)?.str()?;
        Ok(values.get(row).map(str::to_string))
    }

    /// Numeric slice for one die, from `Element[0]` to the last column.
    pub fn element_vector(&self, serial: &str) -> Result<Option<Vec<Option<f64>>>> {
        let Some(row) = self.row_index(serial) else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.measurement_columns.len());
        for name in &self.measurement_columns {
            values.push(self.df.column(name)?.f64()?.get(row));
        }
        Ok(Some(values))
    }

    fn row_index(&self, serial: &str) -> Option<usize> {
        self.serials.binary_search_by(|probe| probe.as_str().cmp(serial)).ok()
    }
}

/// Row-by-row accumulator behind [`MeasurementTable::from_records`].
#[derive(Default)]
struct TableBuilder {
    serials: Vec<String>,
    text_index: HashMap<String, usize>,
    text: Vec<(String, Vec<Option<String>>)>,
    numeric_index: HashMap<String, usize>,
    numeric: Vec<(String, Vec<Option<f64>>)>,
}

impl TableBuilder {
    fn push(&mut self, record: DeviceRecord) {
        let row = self.serials.len();
        self.serials.push(record.serial.to_string());

        for (name, value) in record.text_fields {
            let idx = column_slot(&mut self.text_index, &mut self.text, name, row);
            set_cell(&mut self.text[idx].1, row, value);
        }
        for (name, value) in record.measurements {
            let idx = column_slot(&mut self.numeric_index, &mut self.numeric, name, row);
            set_cell(&mut self.numeric[idx].1, row, value);
        }

        let height = row + 1;
        pad_columns(&mut self.text, height);
        pad_columns(&mut self.numeric, height);
    }

    fn finish(self) -> Result<MeasurementTable> {
        let mut columns: Vec<Column> = Vec::with_capacity(1 + self.text.len() + self.numeric.len());
        let serial_refs: Vec<&str> = self.serials.iter().map(String::as_str).collect();
        columns.push(Series::new(SERIAL_COLUMN.into(), serial_refs).into());

        for (name, values) in &self.text {
            let utf8: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
            columns.push(Series::new(name.as_str().into(), utf8).into());
        }
        for (name, values) in &self.numeric {
            columns.push(Series::new(name.as_str().into(), values.clone()).into());
        }

        let df = DataFrame::new(columns)?;
        Ok(MeasurementTable {
            df,
            text_columns: self.text.into_iter().map(|(name, _)| name).collect(),
            measurement_columns: self.numeric.into_iter().map(|(name, _)| name).collect(),
            serials: self.serials,
        })
    }
}

/// Index of the column named `name`, creating it null-filled up to `row`.
fn column_slot<T>(
    index: &mut HashMap<String, usize>,
    columns: &mut Vec<(String, Vec<Option<T>>)>,
    name: String,
    row: usize,
) -> usize {
    if let Some(&idx) = index.get(&name) {
        return idx;
    }
    let mut values = Vec::with_capacity(row + 1);
    values.resize_with(row, || None);
    columns.push((name.clone(), values));
    index.insert(name, columns.len() - 1);
    columns.len() - 1
}

/// A name repeated within one record keeps the last value.
fn set_cell<T>(values: &mut Vec<Option<T>>, row: usize, value: Option<T>) {
    if values.len() > row {
        values[row] = value;
    } else {
        values.push(value);
    }
}

fn pad_columns<T>(columns: &mut [(String, Vec<Option<T>>)], height: usize) {
    for (_, values) in columns.iter_mut() {
        if values.len() < height {
            values.resize_with(height, || None);
        }
    }
}

/// Measurement tables keyed by `"{test}___{measurement}"`, in the order the tests were requested.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    tables: Vec<(String, MeasurementTable)>,
}

impl Dataset {
    pub fn get(&self, key: &str) -> Option<&MeasurementTable> {
        self.tables
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, table)| table)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(key, _)| key.as_str())
    }

    pub fn key_set(&self) -> BTreeSet<String> {
        self.keys().map(str::to_string).collect()
    }

    /// Most recently added table.
    pub fn last(&self) -> Option<(&str, &MeasurementTable)> {
        self.tables.last().map(|(key, table)| (key.as_str(), table))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MeasurementTable)> {
        self.tables.iter().map(|(key, table)| (key.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn insert(&mut self, key: String, table: MeasurementTable) {
        self.tables.push((key, table));
    }
}

/// Extracts every file for every test and builds one table per test.
///
/// Reports without the requested test are skipped with a warning. Any other
/// extraction failure aborts assembly. A test that no report contains is
/// left out of the dataset.
pub fn assemble<P: AsRef<Path>>(
    files: &[P],
    specs: &[TestSpec],
    direction: SignalDirection,
) -> Result<Dataset> {
    let mut dataset = Dataset::default();

    for spec in specs {
        let key = spec.key();
        if dataset.contains_key(&key) {
            warn!(key = %key, "test listed twice; keeping the first table");
            continue;
        }

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let path = file.as_ref();
            match extract_report(path, spec, direction) {
                Ok(record) => records.push(record),
                Err(err) if err.is_no_match() => {
                    warn!(path = %path.display(), test = %spec, "report has no matching test; skipping");
                }
                Err(source) => {
                    return Err(PipelineError::Report {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }

        if records.is_empty() {
            warn!(key = %key, "no report contained this test; omitting it");
            continue;
        }

        let table = MeasurementTable::from_records(&key, records)?;
        info!(key = %key, rows = table.height(), "table added");
        dataset.insert(key, table);
    }

    Ok(dataset)
}

/// Baseline and elevated datasets must cover the same tests.
pub fn ensure_matching_keys(baseline: &Dataset, elevated: &Dataset) -> Result<()> {
    let baseline_keys = baseline.key_set();
    let elevated_keys = elevated.key_set();
    if baseline_keys == elevated_keys {
        return Ok(());
    }
    Err(PipelineError::DatasetMismatch {
        baseline_only: baseline_keys.difference(&elevated_keys).cloned().collect(),
        elevated_only: elevated_keys.difference(&baseline_keys).cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wafermap_parser::DeviceSerial;

    fn record(serial: &str, result: &str, values: &[(&str, Option<f64>)]) -> DeviceRecord {
        DeviceRecord {
            serial: DeviceSerial::from_product_sn(serial).expect("serial"),
            text_fields: vec![
                ("ProductSN".to_string(), Some(serial.to_string())),
                ("TestResult".to_string(), Some(result.to_string())),
            ],
            measurements: values
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    #[test]
    fn rows_are_sorted_by_serial() {
        let records = vec![
            record("LOT-003_004", "Passed", &[("Tx Element[0]", Some(3.0))]),
            record("LOT-001_002", "Failed", &[("Tx Element[0]", Some(1.0))]),
        ];
        let table = MeasurementTable::from_records("k", records).expect("table");

        assert_eq!(table.serials(), ["001_002".to_string(), "003_004".to_string()]);
        assert_eq!(
            table.element_vector("003_004").expect("lookup"),
            Some(vec![Some(3.0)])
        );
        assert_eq!(
            table.text_value("001_002", "TestResult").expect("lookup"),
            Some("Failed".to_string())
        );
        assert_eq!(table.frame().width(), 4);
    }

    #[test]
    fn schema_drift_is_null_filled() {
        let records = vec![
            record(
                "LOT-001_002",
                "Passed",
                &[("Tx Element[0]", Some(1.0)), ("Tx Element[1]", Some(2.0))],
            ),
            record("LOT-003_004", "Passed", &[("Tx Element[0]", Some(5.0))]),
            record(
                "LOT-005_006",
                "Passed",
                &[
                    ("Tx Element[0]", Some(7.0)),
                    ("Tx Element[1]", Some(8.0)),
                    ("Tx Element[2]", Some(9.0)),
                ],
            ),
        ];
        let table = MeasurementTable::from_records("k", records).expect("table");

        assert_eq!(table.measurement_columns().len(), 3);
        assert_eq!(
            table.element_vector("001_002").expect("lookup"),
            Some(vec![Some(1.0), Some(2.0), None])
        );
        assert_eq!(
            table.element_vector("003_004").expect("lookup"),
            Some(vec![Some(5.0), None, None])
        );
        let column = table.frame().column("Tx Element[2]").expect("column");
        assert_eq!(column.null_count(), 2);
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let records = vec![
            record("LOT-A-001_002", "Passed", &[("Tx Element[0]", Some(1.0))]),
            record("LOT-B-001_002", "Passed", &[("Tx Element[0]", Some(2.0))]),
        ];
        let err = MeasurementTable::from_records("k", records)
            .expect_err("duplicate serial");

        assert!(matches!(err, PipelineError::DuplicateSerial { ref serial, .. } if serial == "001_002"));
    }

    #[test]
    fn unknown_serial_has_no_vector() {
        let records = vec![record("LOT-001_002", "Passed", &[("Tx Element[0]", Some(1.0))])];
        let table = MeasurementTable::from_records("k", records).expect("table");

        assert_eq!(table.element_vector("999_999").expect("lookup"), None);
    }

    #[test]
    fn key_mismatch_lists_both_sides() {
        let table = MeasurementTable::from_records(
            "k",
            vec![record("LOT-001_002", "Passed", &[("Tx Element[0]", Some(1.0))])],
        )
        .expect("table");

        let mut baseline = Dataset::default();
        baseline.insert("A".to_string(), table.clone());
        baseline.insert("B".to_string(), table.clone());
        let mut elevated = Dataset::default();
        elevated.insert("A".to_string(), table);

        match ensure_matching_keys(&baseline, &elevated) {
            Err(PipelineError::DatasetMismatch {
                baseline_only,
                elevated_only,
            }) => {
                assert_eq!(baseline_only, vec!["B".to_string()]);
                assert!(elevated_only.is_empty());
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        assert!(ensure_matching_keys(&baseline, &baseline).is_ok());
    }
}
