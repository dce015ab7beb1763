//! Identity parsing for die test result file names.
//!
//! Result files are named `{deviceToken}-{conditionProbe}-{MMDDYYYY HHMMSS...}-...`.
//! Everything the pipeline knows about a file before opening it comes from
//! these dash-delimited tokens.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

pub const BASELINE_MARKER: &str = "Die Test Baseline";
pub const ELEVATED_MARKER: &str = "Die Test Elevated";

const DEVICE_CODE_LEN: usize = 8;
const TIMESTAMP_LEN: usize = 15;
const TIMESTAMP_FORMAT: &str = "%m%d%Y %H%M%S";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("path {} has no file name", .0.display())]
    NoFileName(PathBuf),

    #[error("device token '{token}' is shorter than 8 characters")]
    ShortDeviceToken { token: String },

    #[error("probe identity '{probe}' names neither a baseline nor an elevated run")]
    UnknownCondition { probe: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Condition {
    Baseline,
    Elevated,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Baseline => "Baseline",
            Condition::Elevated => "Elevated",
        }
    }

    /// Thermal state shown on plots.
    pub fn thermal_label(&self) -> &'static str {
        match self {
            Condition::Baseline => "Ambient",
            Condition::Elevated => "Hot",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Condition::Baseline => BASELINE_MARKER,
            Condition::Elevated => ELEVATED_MARKER,
        }
    }

    /// Elevated is checked first, matching how probe tokens are routed.
    pub fn from_probe(probe: &ProbeIdentity) -> Option<Self> {
        if probe.as_str().contains("ELEVATED") {
            Some(Condition::Elevated)
        } else if probe.as_str().contains("BASELINE") {
            Some(Condition::Baseline)
        } else {
            None
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Condition {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "baseline" | "ambient" | "amb" => Ok(Condition::Baseline),
            "elevated" | "hot" => Ok(Condition::Elevated),
            other => Err(format!("unknown test condition '{other}'")),
        }
    }
}

/// Uppercased first two dash tokens: the device token plus the
/// condition/probe token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeIdentity(String);

impl ProbeIdentity {
    pub fn from_file_name(file_name: &str) -> Self {
        let joined = file_name.split('-').take(2).collect::<Vec<_>>().join("-");
        Self(joined.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProbeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trailing characters of the first dash token, matched against the
/// expected-device list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceCode(String);

impl DeviceCode {
    pub fn from_token(token: &str) -> Result<Self, NamingError> {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < DEVICE_CODE_LEN {
            return Err(NamingError::ShortDeviceToken {
                token: token.to_string(),
            });
        }
        let tail: String = chars[chars.len() - DEVICE_CODE_LEN..].iter().collect();
        Ok(Self(tail.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run time embedded in the third dash token. A token that does not parse is
/// kept with its reason and ranks older than any parsed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTimestamp {
    Parsed(NaiveDateTime),
    Unparsed { token: String, reason: String },
}

impl RunTimestamp {
    pub fn from_file_name(file_name: &str) -> Self {
        let Some(raw) = file_name.split('-').nth(2) else {
            return RunTimestamp::Unparsed {
                token: String::new(),
                reason: "file name has no timestamp token".to_string(),
            };
        };
        let token: String = raw.trim().chars().take(TIMESTAMP_LEN).collect();
        match NaiveDateTime::parse_from_str(&token, TIMESTAMP_FORMAT) {
            Ok(parsed) => RunTimestamp::Parsed(parsed),
            Err(err) => RunTimestamp::Unparsed {
                token,
                reason: err.to_string(),
            },
        }
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        match self {
            RunTimestamp::Parsed(dt) => Some(*dt),
            RunTimestamp::Unparsed { .. } => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, RunTimestamp::Parsed(_))
    }

    /// Recency order; every unparsed timestamp compares equal and oldest.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.datetime().cmp(&other.datetime())
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTimestamp::Parsed(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            RunTimestamp::Unparsed { token, .. } => write!(f, "unparsed '{token}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    pub path: PathBuf,
    pub probe_identity: ProbeIdentity,
    pub condition: Condition,
    pub timestamp: RunTimestamp,
    pub device_code: DeviceCode,
}

impl ResultFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, NamingError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| NamingError::NoFileName(path.clone()))?;

        let probe_identity = ProbeIdentity::from_file_name(&file_name);
        let condition =
            Condition::from_probe(&probe_identity).ok_or_else(|| NamingError::UnknownCondition {
                probe: probe_identity.to_string(),
            })?;
        let device_token = file_name.split('-').next().unwrap_or_default();
        let device_code = DeviceCode::from_token(device_token)?;
        let timestamp = RunTimestamp::from_file_name(&file_name);

        Ok(Self {
            path,
            probe_identity,
            condition,
            timestamp,
            device_code,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl AsRef<Path> for ResultFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
