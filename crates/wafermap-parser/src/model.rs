use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ReportError;

/// Scalar fields read from the report `Setup` section, in column order.
pub const SETUP_FIELDS: [&str; 10] = [
    "Timestamp",
    "ReportRevision",
    "Operator",
    "Equipment",
    "PlatformTestSW",
    "ProductTestSW",
    "Product",
    "ProcessStep",
    "LotNumber",
    "ProductSN",
];

pub const OVERALL_RESULT: &str = "OverallResult";
pub const TEST_RESULT: &str = "TestResult";

/// Separator between test name and measurement label in dataset keys.
pub const KEY_SEPARATOR: &str = "___";

/// Number of trailing ProductSN characters that identify a die.
pub const SERIAL_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalDirection {
    Tx,
    Rx,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Tx => "Tx",
            SignalDirection::Rx => "Rx",
        }
    }

    /// Name of the first numeric column, e.g. `Tx Element[0]`.
    pub fn boundary_column(&self) -> String {
        format!("{} Element[0]", self.as_str())
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SignalDirection {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tx" => Ok(SignalDirection::Tx),
            "rx" => Ok(SignalDirection::Rx),
            other => Err(format!("unknown signal direction '{other}'")),
        }
    }
}

/// One named test/measurement pair to extract from the `Detail` section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    #[serde(alias = "measurement_label")]
    pub measurement: String,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measurement: measurement.into(),
        }
    }

    /// The peak-to-peak element test run for every direction.
    pub fn peak_to_peak(direction: SignalDirection) -> Self {
        Self::new(format!("{direction} Element Peak-Peak"), "Pk-Pk")
    }

    /// Dataset key, `"{name}___{measurement}"`.
    pub fn key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.name, self.measurement)
    }
}

impl fmt::Display for TestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.name, self.measurement)
    }
}

/// Die identifier: the trailing characters of the report's ProductSN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceSerial(String);

impl DeviceSerial {
    pub fn from_product_sn(product_sn: &str) -> Result<Self, ReportError> {
        let trimmed = product_sn.trim();
        let chars: Vec<char> = trimmed.chars().collect();
        if chars.len() < SERIAL_LEN {
            return Err(ReportError::InvalidSerial {
                value: trimmed.to_string(),
                reason: format!(
                    "expected at least {SERIAL_LEN} characters, found {}",
                    chars.len()
                ),
            });
        }
        let serial: String = chars[chars.len() - SERIAL_LEN..].iter().collect();
        Ok(Self(serial))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flat extraction of one report for one test.
///
/// `text_fields` hold the Setup metadata, `OverallResult`, `TestResult` and any
/// record values that precede the boundary column. `measurements` start at
/// the boundary column and run to the end of the record list.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub serial: DeviceSerial,
    pub text_fields: Vec<(String, Option<String>)>,
    pub measurements: Vec<(String, Option<f64>)>,
}

impl DeviceRecord {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text_fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn measurement(&self, name: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| *value)
    }

    pub fn measurement_values(&self) -> Vec<Option<f64>> {
        self.measurements.iter().map(|(_, value)| *value).collect()
    }
}
