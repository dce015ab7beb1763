use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::io::parquet::write::{ParquetCompression, ParquetWriter};
use polars::prelude::{CsvWriter, SerWriter};
use tracing::info;

use crate::assembly::Dataset;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Parquet => "parquet",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Writes every table of `dataset` to `dir` as `{label}_{key}.{ext}` and
/// returns the written paths in dataset order.
pub fn write_dataset(
    dataset: &Dataset,
    dir: &Path,
    label: &str,
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(dataset.len());

    for (key, table) in dataset.iter() {
        let path = dir.join(format!(
            "{}_{}.{}",
            file_stem(label),
            file_stem(key),
            format.extension()
        ));
        let mut file = File::create(&path)?;
        let mut df = table.frame().clone();
        match format {
            ExportFormat::Parquet => {
                ParquetWriter::new(&mut file)
                    .with_compression(ParquetCompression::Zstd(None))
                    .finish(&mut df)?;
            }
            ExportFormat::Csv => {
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(&mut df)?;
            }
        }
        info!(path = %path.display(), rows = df.height(), "table exported");
        written.push(path);
    }

    Ok(written)
}

/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
fn file_stem(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_are_filesystem_safe() {
        assert_eq!(
            file_stem("Tx Element Peak-Peak___Pk-Pk"),
            "Tx_Element_Peak-Peak___Pk-Pk"
        );
        assert_eq!(file_stem("a/b\\c:d"), "a_b_c_d");
    }
}
