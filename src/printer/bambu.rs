//! LAN client for Bambu Lab printers: MQTT for control, implicit FTPS for files.

use rustls::ClientConfig;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::printer::commands::ProjectFile;
use crate::printer::ftps::FtpsClient;
use crate::printer::mqtt::MqttSession;
use crate::printer::{tls, PrinterClient, PrinterError};

static FTP_USERNAME: &str = "bblp";

/// Bambu printer connection configuration.
#[derive(Debug, Clone)]
pub(crate) struct BambuConfig {
    /// Printer IP address or host name.
    pub host: String,
    /// Printer serial number, needed to address MQTT topics.
    pub serial: Option<String>,
    /// Access code (from printer's LAN mode settings).
    pub access_code: String,
    /// Connection and socket timeout.
    pub timeout: Duration,
}

impl BambuConfig {
    pub fn new(host: &str, access_code: &str, serial: Option<&str>) -> Self {
        Self {
            host: host.to_string(),
            serial: serial.map(str::to_string),
            access_code: access_code.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub(crate) struct BambuPrinter {
    config: BambuConfig,
    tls: Arc<ClientConfig>,
    mqtt: Option<MqttSession>,
}

impl BambuPrinter {
    pub fn new(config: BambuConfig) -> Self {
        Self {
            config,
            tls: tls::client_config(),
            mqtt: None,
        }
    }
}

impl PrinterClient for BambuPrinter {
    fn connect(&mut self) -> Result<(), PrinterError> {
        let serial = self
            .config
            .serial
            .as_deref()
            .ok_or(PrinterError::MissingSerial)?;
        let session = MqttSession::connect(&self.config, serial, Arc::clone(&self.tls))?;
        self.mqtt = Some(session);

        Ok(())
    }

    fn upload_file(
        &mut self,
        file: &mut dyn Read,
        name: &str,
    ) -> Result<Option<String>, PrinterError> {
        let mut ftp = FtpsClient::connect(
            &self.config.host,
            Arc::clone(&self.tls),
            self.config.timeout,
        )?;
        ftp.login(FTP_USERNAME, &self.config.access_code)?;
        let reply = ftp.put(name, file)?;

        if let Err(e) = ftp.quit() {
            tracing::debug!("Ignoring error while closing FTPS session: {}", e);
        }

        if !reply.is_positive() {
            tracing::debug!(reply = %reply.text, "Printer did not confirm the upload");
            return Ok(None);
        }

        Ok(Some(reply.text))
    }

    fn start_print(
        &mut self,
        name: &str,
        plate_location: &str,
        use_ams: bool,
        ams_mapping: &[i32],
        flow_calibration: bool,
    ) -> Result<bool, PrinterError> {
        let mqtt = self.mqtt.as_mut().ok_or(PrinterError::NotConnected)?;

        mqtt.start_print(&ProjectFile {
            file: name,
            plate_location,
            use_ams,
            ams_mapping,
            flow_calibration,
        })
    }

    fn disconnect(&mut self) -> Result<(), PrinterError> {
        match self.mqtt.take() {
            Some(mut session) => session.disconnect(),
            None => Ok(()),
        }
    }
}
