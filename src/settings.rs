use crate::error::AdapterError;
use crate::types::{Dispatch, Mode, PlateNumber, PrintJob, DEFAULT_AMS_MAPPING};
use crate::{Cli, DispatchSettings};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Validated dispatch request assembled from the environment.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub ip_address: String,
    pub serial_number: Option<String>,
    pub access_code: String,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Normalized (trimmed, lowercase) mode name, resolved by [`Settings::dispatch`]
    pub mode: String,
    options: DispatchSettings,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, AdapterError> {
    non_empty(value).ok_or(AdapterError::MissingSetting(name))
}

fn flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

pub(crate) fn parse_ams_mapping(raw: &str) -> Result<Vec<i32>, AdapterError> {
    let mapping = raw
        .split(',')
        .map(str::trim)
        .filter(|slot| !slot.is_empty())
        .map(|slot| slot.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AdapterError::InvalidAmsMapping)?;

    if mapping.is_empty() {
        return Ok(DEFAULT_AMS_MAPPING.to_vec());
    }

    Ok(mapping)
}

/// An empty outbox setting means the working directory.
fn outbox_dir(raw: &str) -> PathBuf {
    if raw.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(raw)
    }
}

pub(crate) fn parse_settle_seconds(raw: &str) -> Result<Duration, AdapterError> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AdapterError::InvalidSettleSeconds)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| AdapterError::InvalidSettleSeconds)
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self, AdapterError> {
        let ip_address = required(&cli.ip_address, "BAMBU_IP_ADDRESS")?;
        let serial_number = non_empty(&cli.serial_number);
        let access_code = required(&cli.access_code, "BAMBU_ACCESS_CODE")?;
        let file_name = required(&cli.file_name, "BAMBU_FILE_NAME")?;
        let file_path = PathBuf::from(required(&cli.file_path, "BAMBU_FILE_PATH")?);

        if !file_path.exists() {
            return Err(AdapterError::FileNotFound(file_path));
        }

        let is_3mf = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("3mf"));
        if !is_3mf {
            return Err(AdapterError::UnsupportedFileType);
        }

        Ok(Self {
            ip_address,
            serial_number,
            access_code,
            file_name,
            file_path,
            mode: cli.dispatch.mode.trim().to_lowercase(),
            options: cli.dispatch.clone(),
        })
    }

    /// Resolve the mode and parse the parameters only that mode needs.
    pub fn dispatch(&self) -> Result<Dispatch, AdapterError> {
        let mode = Mode::from_str(&self.mode).map_err(|_| AdapterError::UnsupportedMode)?;

        match mode {
            Mode::Stub => Ok(Dispatch::Stub),
            Mode::Copy => Ok(Dispatch::Copy {
                outbox: outbox_dir(&self.options.copy_dir),
            }),
            Mode::BambuLabsApi => Ok(Dispatch::Printer(PrintJob {
                plate_number: PlateNumber::parse(&self.options.plate_number),
                use_ams: flag(&self.options.use_ams),
                ams_mapping: parse_ams_mapping(&self.options.ams_mapping)?,
                flow_calibration: flag(&self.options.flow_calibration),
                connect_settle: parse_settle_seconds(&self.options.connect_settle_seconds)?,
            })),
        }
    }
}
