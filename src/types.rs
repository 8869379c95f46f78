use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use strum::EnumString;

pub(crate) static DEFAULT_AMS_MAPPING: [i32; 1] = [0];

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, strum::Display, Serialize)]
#[strum(ascii_case_insensitive)]
pub(crate) enum Mode {
    #[strum(serialize = "stub")]
    #[serde(rename = "stub")]
    Stub,
    #[strum(serialize = "copy")]
    #[serde(rename = "copy")]
    Copy,
    #[strum(serialize = "bambulabs_api")]
    #[serde(rename = "bambulabs_api")]
    BambuLabsApi,
}

/// Plate selector inside a multi-plate project.
///
/// Integer values address `Metadata/plate_<n>.gcode`, anything else is passed
/// to the printer verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum PlateNumber {
    Index(i64),
    Path(String),
}

impl PlateNumber {
    /// Plain decimal integers that fit an `i64` become an index. Anything else,
    /// including `1_000` or out-of-range digits, is kept as a path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse() {
            Ok(index) => PlateNumber::Index(index),
            Err(_) => PlateNumber::Path(raw.to_string()),
        }
    }

    pub fn gcode_location(&self) -> String {
        match self {
            PlateNumber::Index(index) => format!("Metadata/plate_{index}.gcode"),
            PlateNumber::Path(path) => path.clone(),
        }
    }
}

impl Display for PlateNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlateNumber::Index(index) => write!(f, "{index}"),
            PlateNumber::Path(path) => write!(f, "{path}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PrintJob {
    pub plate_number: PlateNumber,
    pub use_ams: bool,
    pub ams_mapping: Vec<i32>,
    pub flow_calibration: bool,
    pub connect_settle: Duration,
}

/// What to do with a validated file, one variant per mode.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Dispatch {
    Stub,
    Copy { outbox: PathBuf },
    Printer(PrintJob),
}

impl Dispatch {
    pub fn mode(&self) -> Mode {
        match self {
            Dispatch::Stub => Mode::Stub,
            Dispatch::Copy { .. } => Mode::Copy,
            Dispatch::Printer(_) => Mode::BambuLabsApi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::from_str("stub").unwrap(), Mode::Stub);
        assert_eq!(Mode::from_str("COPY").unwrap(), Mode::Copy);
        assert_eq!(
            Mode::from_str("bambulabs_api").unwrap(),
            Mode::BambuLabsApi
        );
        assert!(Mode::from_str("foo").is_err());
        assert_eq!(Mode::BambuLabsApi.to_string(), "bambulabs_api");
    }

    #[test]
    fn test_plate_number() {
        assert_eq!(PlateNumber::parse("2"), PlateNumber::Index(2));
        assert_eq!(PlateNumber::parse(" 3 ").gcode_location(), "Metadata/plate_3.gcode");

        let custom = PlateNumber::parse("Metadata/plate_7.gcode");
        assert_eq!(custom, PlateNumber::Path("Metadata/plate_7.gcode".into()));
        assert_eq!(custom.gcode_location(), "Metadata/plate_7.gcode");

        assert_eq!(PlateNumber::parse("-1"), PlateNumber::Index(-1));
        assert_eq!(PlateNumber::parse("1_000"), PlateNumber::Path("1_000".into()));
        assert_eq!(
            PlateNumber::parse("99999999999999999999"),
            PlateNumber::Path("99999999999999999999".into())
        );

        assert_eq!(serde_json::to_value(PlateNumber::Index(2)).unwrap(), 2);
        assert_eq!(
            serde_json::to_value(PlateNumber::Path("first".into())).unwrap(),
            "first"
        );
    }
}
