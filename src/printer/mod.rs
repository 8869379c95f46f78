//! Printer client abstraction and the scoped printer session.
//!
//! [`PrinterClient`] is the narrow surface the dispatcher needs: connect,
//! upload a file, start a print and disconnect. The LAN implementation for
//! Bambu Lab printers lives in [`bambu`] and is only compiled with the `lan`
//! feature.

use std::io::Read;
use thiserror::Error;

use crate::types::PrintJob;

#[cfg(feature = "lan")]
pub(crate) mod bambu;
#[cfg(feature = "lan")]
mod commands;
#[cfg(feature = "lan")]
mod ftps;
#[cfg(feature = "lan")]
mod mqtt;
#[cfg(feature = "lan")]
mod tls;

/// Errors from printer operations.
#[derive(Debug, Error)]
pub(crate) enum PrinterError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// MQTT error.
    #[error("MQTT error: {0}")]
    Mqtt(String),
    /// FTP command rejected or malformed reply.
    #[error("FTP error: {0}")]
    Ftp(String),
    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("serial number is required to address the printer")]
    MissingSerial,
    #[error("not connected to the printer")]
    NotConnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) trait PrinterClient {
    fn connect(&mut self) -> Result<(), PrinterError>;

    /// Store `file` on the printer as `name`. `None` means the printer did
    /// not confirm the transfer.
    fn upload_file(&mut self, file: &mut dyn Read, name: &str)
        -> Result<Option<String>, PrinterError>;

    /// Returns `false` when the start command could not be delivered.
    fn start_print(
        &mut self,
        name: &str,
        plate_location: &str,
        use_ams: bool,
        ams_mapping: &[i32],
        flow_calibration: bool,
    ) -> Result<bool, PrinterError>;

    fn disconnect(&mut self) -> Result<(), PrinterError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    Uninitialized,
    Connected,
    Uploaded,
    PrintStarted,
    Disconnected,
}

/// Owns a printer client for the duration of one dispatch.
///
/// Dropping the session always attempts a disconnect, whatever state the
/// dispatch reached. Disconnect errors are logged and discarded.
pub(crate) struct Session<P: PrinterClient> {
    printer: P,
    state: SessionState,
}

impl<P: PrinterClient> Session<P> {
    pub fn open(printer: P) -> Self {
        Self {
            printer,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connect(&mut self) -> Result<(), PrinterError> {
        self.printer.connect()?;
        self.state = SessionState::Connected;
        Ok(())
    }

    pub fn upload(
        &mut self,
        file: &mut dyn Read,
        name: &str,
    ) -> Result<Option<String>, PrinterError> {
        let result = self.printer.upload_file(file, name)?;
        if result.is_some() {
            self.state = SessionState::Uploaded;
        }
        Ok(result)
    }

    pub fn start_print(&mut self, name: &str, job: &PrintJob) -> Result<bool, PrinterError> {
        let started = self.printer.start_print(
            name,
            &job.plate_number.gcode_location(),
            job.use_ams,
            &job.ams_mapping,
            job.flow_calibration,
        )?;
        if started {
            self.state = SessionState::PrintStarted;
        }
        Ok(started)
    }
}

impl<P: PrinterClient> Drop for Session<P> {
    fn drop(&mut self) {
        tracing::debug!(state = ?self.state, "Closing printer session");
        if let Err(e) = self.printer.disconnect() {
            tracing::debug!("Ignoring error while disconnecting: {}", e);
        }
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::PlateNumber;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Call {
        Connect,
        Upload { name: String, bytes: Vec<u8> },
        StartPrint {
            name: String,
            plate_location: String,
            use_ams: bool,
            ams_mapping: Vec<i32>,
            flow_calibration: bool,
        },
        Disconnect,
    }

    /// Scripted client that records every call it receives.
    pub(crate) struct MockPrinter {
        pub calls: Rc<RefCell<Vec<Call>>>,
        pub fail_connect: bool,
        pub upload_result: Option<String>,
        pub start_result: bool,
        pub fail_disconnect: bool,
    }

    impl MockPrinter {
        pub fn new() -> Self {
            Self {
                calls: Rc::new(RefCell::new(Vec::new())),
                fail_connect: false,
                upload_result: Some("226 Transfer complete".into()),
                start_result: true,
                fail_disconnect: false,
            }
        }
    }

    impl PrinterClient for MockPrinter {
        fn connect(&mut self) -> Result<(), PrinterError> {
            self.calls.borrow_mut().push(Call::Connect);
            if self.fail_connect {
                return Err(PrinterError::ConnectionFailed("connection refused".into()));
            }
            Ok(())
        }

        fn upload_file(
            &mut self,
            file: &mut dyn Read,
            name: &str,
        ) -> Result<Option<String>, PrinterError> {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            self.calls.borrow_mut().push(Call::Upload {
                name: name.to_string(),
                bytes,
            });
            Ok(self.upload_result.clone())
        }

        fn start_print(
            &mut self,
            name: &str,
            plate_location: &str,
            use_ams: bool,
            ams_mapping: &[i32],
            flow_calibration: bool,
        ) -> Result<bool, PrinterError> {
            self.calls.borrow_mut().push(Call::StartPrint {
                name: name.to_string(),
                plate_location: plate_location.to_string(),
                use_ams,
                ams_mapping: ams_mapping.to_vec(),
                flow_calibration,
            });
            Ok(self.start_result)
        }

        fn disconnect(&mut self) -> Result<(), PrinterError> {
            self.calls.borrow_mut().push(Call::Disconnect);
            if self.fail_disconnect {
                return Err(PrinterError::Mqtt("broken pipe".into()));
            }
            Ok(())
        }
    }

    fn job() -> PrintJob {
        PrintJob {
            plate_number: PlateNumber::Index(2),
            use_ams: true,
            ams_mapping: vec![0, 1],
            flow_calibration: false,
            connect_settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_session_walks_states() {
        let printer = MockPrinter::new();
        let calls = printer.calls.clone();

        let mut session = Session::open(printer);
        assert_eq!(session.state(), SessionState::Uninitialized);
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        session.upload(&mut &b"data"[..], "a.3mf").unwrap();
        assert_eq!(session.state(), SessionState::Uploaded);
        assert!(session.start_print("a.3mf", &job()).unwrap());
        assert_eq!(session.state(), SessionState::PrintStarted);
        drop(session);

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Connect,
                Call::Upload {
                    name: "a.3mf".into(),
                    bytes: b"data".to_vec()
                },
                Call::StartPrint {
                    name: "a.3mf".into(),
                    plate_location: "Metadata/plate_2.gcode".into(),
                    use_ams: true,
                    ams_mapping: vec![0, 1],
                    flow_calibration: false,
                },
                Call::Disconnect,
            ]
        );
    }

    #[test]
    fn test_drop_disconnects_without_connect() {
        let printer = MockPrinter::new();
        let calls = printer.calls.clone();

        drop(Session::open(printer));

        assert_eq!(*calls.borrow(), vec![Call::Disconnect]);
    }

    #[test]
    fn test_disconnect_errors_are_swallowed() {
        let mut printer = MockPrinter::new();
        printer.fail_disconnect = true;
        let calls = printer.calls.clone();

        let mut session = Session::open(printer);
        session.connect().unwrap();
        drop(session);

        assert_eq!(*calls.borrow(), vec![Call::Connect, Call::Disconnect]);
    }
}
