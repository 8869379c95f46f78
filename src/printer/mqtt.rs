//! MQTT control channel for Bambu printers.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rumqttc::{
    Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use rustls::ClientConfig;

use crate::printer::bambu::BambuConfig;
use crate::printer::commands::{report_topic, request_topic, ProjectFile};
use crate::printer::PrinterError;

static MQTT_PORT: u16 = 8883;
static MQTT_USERNAME: &str = "bblp";
// Full status reports are well above rumqttc's 10 KiB default
static MAX_PACKET_SIZE: usize = 1024 * 1024;

/// What the event loop thread reports back to the session.
#[derive(Debug, PartialEq)]
enum Notice {
    Connected,
    Published,
    Disconnected,
    Failed(String),
}

pub(crate) struct MqttSession {
    client: Client,
    notices: Receiver<Notice>,
    serial: String,
    timeout: Duration,
}

impl MqttSession {
    /// Connect to the printer's broker and subscribe to its report topic.
    ///
    /// The connection is driven on its own thread for the life of the session,
    /// so keep-alives keep flowing while the upload runs on the caller's thread.
    pub fn connect(
        config: &BambuConfig,
        serial: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<Self, PrinterError> {
        let client_id = format!("bambu-adapter_{}", uuid::Uuid::new_v4());

        let mut mqtt_options = MqttOptions::new(&client_id, config.host.as_str(), MQTT_PORT);
        mqtt_options.set_credentials(MQTT_USERNAME, &config.access_code);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);
        mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        mqtt_options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls)));

        let (client, connection) = Client::new(mqtt_options, 16);
        let (sender, notices) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".into())
            .spawn(move || drive(connection, sender))?;

        let mut session = Self {
            client,
            notices,
            serial: serial.to_string(),
            timeout: config.timeout,
        };

        tracing::debug!(client_id, host = %config.host, "Connecting to printer MQTT broker");
        match session.wait_for(Notice::Connected) {
            Ok(true) => tracing::debug!("MQTT connection established"),
            Ok(false) => return Err(PrinterError::Timeout("MQTT connection timeout".into())),
            Err(PrinterError::Mqtt(e)) => return Err(PrinterError::ConnectionFailed(e)),
            Err(e) => return Err(e),
        }
        session.subscribe()?;

        Ok(session)
    }

    fn subscribe(&mut self) -> Result<(), PrinterError> {
        self.client
            .subscribe(report_topic(&self.serial), QoS::AtMostOnce)
            .map_err(|e| PrinterError::Mqtt(e.to_string()))
    }

    /// Publish a start command. Returns `true` once the publish has been
    /// written to the broker connection.
    pub fn start_print(&mut self, command: &ProjectFile<'_>) -> Result<bool, PrinterError> {
        let payload = command.to_json().to_string();
        tracing::trace!(payload, "Publishing project_file command");

        self.client
            .publish(request_topic(&self.serial), QoS::AtMostOnce, false, payload)
            .map_err(|e| PrinterError::Mqtt(e.to_string()))?;

        self.wait_for(Notice::Published)
    }

    pub fn disconnect(&mut self) -> Result<(), PrinterError> {
        self.client
            .disconnect()
            .map_err(|e| PrinterError::Mqtt(e.to_string()))?;

        self.wait_for(Notice::Disconnected).map(|_| ())
    }

    /// Wait until the event loop reports `expected`, fails, or the timeout passes.
    fn wait_for(&mut self, expected: Notice) -> Result<bool, PrinterError> {
        wait_for_notice(&self.notices, expected, self.timeout)
    }
}

fn wait_for_notice(
    notices: &Receiver<Notice>,
    expected: Notice,
    timeout: Duration,
) -> Result<bool, PrinterError> {
    let start = Instant::now();

    while let Some(remaining) = timeout.checked_sub(start.elapsed()) {
        match notices.recv_timeout(remaining) {
            Ok(Notice::Failed(e)) => return Err(PrinterError::Mqtt(e)),
            Ok(notice) if notice == expected => return Ok(true),
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PrinterError::Mqtt("MQTT event loop stopped".into()))
            }
        }
    }

    Ok(false)
}

/// Poll the connection until it fails, the client is dropped, or the session
/// stops listening.
fn drive(mut connection: Connection, notices: Sender<Notice>) {
    for event in connection.iter() {
        let notice = match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => Notice::Connected,
            Ok(Event::Outgoing(Outgoing::Publish(_))) => Notice::Published,
            Ok(Event::Outgoing(Outgoing::Disconnect)) => Notice::Disconnected,
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
                continue;
            }
            Err(e) => Notice::Failed(e.to_string()),
        };

        let last = matches!(notice, Notice::Disconnected | Notice::Failed(_));
        if notices.send(notice).is_err() || last {
            break;
        }
    }

    tracing::trace!("MQTT event loop finished");
}
