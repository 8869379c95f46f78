use crate::types::{Mode, PlateNumber};
use serde::Serialize;

pub(crate) static STUB_MESSAGE: &str = "Adapter invoked successfully (no printer dispatch).";
pub(crate) static COPY_MESSAGE: &str = "Copied file to local outbox (simulated dispatch).";
pub(crate) static PRINT_MESSAGE: &str = "Uploaded file and sent start_print command to the printer.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StubReport {
    pub ok: bool,
    pub mode: Mode,
    pub message: &'static str,
    pub ip_address: String,
    pub serial_number: Option<String>,
    pub file_name: String,
    pub file_size_bytes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CopyReport {
    pub ok: bool,
    pub mode: Mode,
    pub message: &'static str,
    pub target_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PrintReport {
    pub ok: bool,
    pub mode: Mode,
    pub message: &'static str,
    pub ip_address: String,
    pub serial_number: Option<String>,
    pub file_name: String,
    pub upload_result: String,
    pub start_result: bool,
    pub plate_number: PlateNumber,
    pub use_ams: bool,
    pub ams_mapping: Vec<i32>,
    pub flow_calibration: bool,
}

/// Success report printed to stdout, one JSON object per run.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Report {
    Stub(StubReport),
    Copy(CopyReport),
    Print(PrintReport),
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stub_report_fields() {
        let report = Report::Stub(StubReport {
            ok: true,
            mode: Mode::Stub,
            message: STUB_MESSAGE,
            ip_address: "192.168.1.50".into(),
            serial_number: None,
            file_name: "benchy.3mf".into(),
            file_size_bytes: 42,
        });

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "ok": true,
                "mode": "stub",
                "message": STUB_MESSAGE,
                "ipAddress": "192.168.1.50",
                "serialNumber": null,
                "fileName": "benchy.3mf",
                "fileSizeBytes": 42
            })
        );
    }

    #[test]
    fn test_print_report_fields() {
        let report = Report::Print(PrintReport {
            ok: true,
            mode: Mode::BambuLabsApi,
            message: PRINT_MESSAGE,
            ip_address: "192.168.1.50".into(),
            serial_number: Some("01S00C123456789".into()),
            file_name: "benchy.3mf".into(),
            upload_result: "226 Transfer complete".into(),
            start_result: true,
            plate_number: PlateNumber::Index(1),
            use_ams: false,
            ams_mapping: vec![0, 1],
            flow_calibration: true,
        });

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["mode"], "bambulabs_api");
        assert_eq!(value["serialNumber"], "01S00C123456789");
        assert_eq!(value["uploadResult"], "226 Transfer complete");
        assert_eq!(value["startResult"], true);
        assert_eq!(value["plateNumber"], 1);
        assert_eq!(value["useAms"], false);
        assert_eq!(value["amsMapping"], json!([0, 1]));
        assert_eq!(value["flowCalibration"], true);
    }
}
