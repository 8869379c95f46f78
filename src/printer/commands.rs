//! Bambu printer MQTT commands.

use serde_json::json;

/// Start printing a project file that was uploaded to the printer's storage.
#[derive(Debug, Clone)]
pub(crate) struct ProjectFile<'a> {
    /// File name on the printer.
    pub file: &'a str,
    /// Plate gcode inside the project, e.g. `Metadata/plate_1.gcode`.
    pub plate_location: &'a str,
    pub use_ams: bool,
    /// Filament slot per material used by the project.
    pub ams_mapping: &'a [i32],
    pub flow_calibration: bool,
}

impl ProjectFile<'_> {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "print": {
                "sequence_id": "0",
                "command": "project_file",
                "param": self.plate_location,
                "file": self.file,
                "subtask_name": self.file,
                "url": format!("ftp:///{}", self.file),
                "bed_type": "auto",
                "timelapse": false,
                "bed_leveling": true,
                "flow_cali": self.flow_calibration,
                "vibration_cali": true,
                "layer_inspect": false,
                "use_ams": self.use_ams,
                "ams_mapping": self.ams_mapping,
                "profile_id": "0",
                "project_id": "0",
                "subtask_id": "0",
                "task_id": "0"
            }
        })
    }
}

/// Topic the printer listens on for commands.
pub(crate) fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}

/// Topic the printer publishes its reports on.
pub(crate) fn report_topic(serial: &str) -> String {
    format!("device/{serial}/report")
}
