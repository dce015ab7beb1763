pub mod assembly;
pub mod catalog;
pub mod config;
pub mod error;
pub mod inventory;
pub mod naming;
pub mod outputs;
pub mod pipeline;
pub mod selection;
pub mod wafer;

pub use assembly::{assemble, ensure_matching_keys, Dataset, MeasurementTable, SERIAL_COLUMN};
pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use naming::{Condition, ResultFile};
pub use pipeline::{process_lot, scan_lot, LotDatasets, LotScan};
