pub mod errors;
pub mod extract;
pub mod model;

pub use errors::ReportError;
pub use extract::{decode_report, extract_report, extract_str};
pub use model::{
    DeviceRecord, DeviceSerial, SignalDirection, TestSpec, KEY_SEPARATOR, OVERALL_RESULT,
    SETUP_FIELDS, TEST_RESULT,
};

#[cfg(test)]
mod tests;
