use std::path::PathBuf;
use thiserror::Error;

use crate::printer::PrinterError;

#[derive(Debug, Error)]
pub(crate) enum AdapterError {
    #[error("Missing {0}")]
    MissingSetting(&'static str),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("This adapter currently expects a .3mf file")]
    UnsupportedFileType,
    #[error("Invalid BAMBU_ADAPTER_AMS_MAPPING. Use comma-separated integers, e.g. 0 or 0,1")]
    InvalidAmsMapping,
    #[error("Invalid BAMBU_ADAPTER_CONNECT_SETTLE_SECONDS. Use a non-negative number of seconds, e.g. 2 or 0.5")]
    InvalidSettleSeconds,
    #[error("Unsupported BAMBU_ADAPTER_MODE. Use 'stub', 'copy', or 'bambulabs_api'.")]
    UnsupportedMode,
    #[error("I/O error reading {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Copy to outbox failed: {0}")]
    Copy(#[source] std::io::Error),
    #[cfg_attr(feature = "lan", allow(dead_code))]
    #[error("Printer client unavailable: built without the 'lan' feature")]
    ClientUnavailable,
    #[error("Printer upload returned no success value")]
    UploadRejected,
    #[error("Printer start_print returned false")]
    StartRejected,
    #[error("Printer dispatch failed: {0}")]
    Dispatch(#[from] PrinterError),
}
