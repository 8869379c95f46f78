//! Minimal implicit FTPS client, just enough to store one file on the printer.

use once_cell::sync::Lazy;
use regex::Regex;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::printer::PrinterError;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

static FTPS_PORT: u16 = 990;
static PASV_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\((?<h1>\d+),(?<h2>\d+),(?<h3>\d+),(?<h4>\d+),(?<p1>\d+),(?<p2>\d+)\)"#).unwrap()
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Read one FTP reply. The lines of a multi-line reply are joined with `" / "`.
pub(crate) fn read_reply(reader: &mut impl BufRead) -> Result<Reply, PrinterError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PrinterError::ConnectionFailed(
            "FTP server closed the connection".into(),
        ));
    }

    let first = line.trim_end();
    let code: u16 = first
        .get(..3)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| PrinterError::Ftp(format!("malformed reply: {first:?}")))?;
    let mut text = first.to_string();

    if first.as_bytes().get(3) == Some(&b'-') {
        let terminator = format!("{code} ");
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(PrinterError::Ftp("truncated multi-line reply".into()));
            }
            let next = line.trim_end();
            text.push_str(" / ");
            text.push_str(next.trim_start());
            if next.starts_with(&terminator) || next == terminator.trim_end() {
                break;
            }
        }
    }

    tracing::trace!(code, text, "FTP reply");
    Ok(Reply { code, text })
}

/// Port of the data connection announced by a `227` reply.
pub(crate) fn parse_pasv_port(text: &str) -> Result<u16, PrinterError> {
    let captures = PASV_REGEX
        .captures(text)
        .ok_or_else(|| PrinterError::Ftp(format!("malformed PASV reply: {text:?}")))?;
    let part = |name: &str| -> Result<u16, PrinterError> {
        captures
            .name(name)
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .map(u16::from)
            .ok_or_else(|| PrinterError::Ftp(format!("malformed PASV reply: {text:?}")))
    };

    Ok(part("p1")? * 256 + part("p2")?)
}

fn open_tls(
    host: &str,
    port: u16,
    tls: &Arc<ClientConfig>,
    timeout: Duration,
) -> Result<TlsStream, PrinterError> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| PrinterError::ConnectionFailed(format!("cannot resolve {host}")))?;
    let sock = TcpStream::connect_timeout(&addr, timeout)?;
    sock.set_read_timeout(Some(timeout))?;
    sock.set_write_timeout(Some(timeout))?;

    let server_name = ServerName::try_from(host)
        .map_err(|e| PrinterError::Tls(e.to_string()))?
        .to_owned();
    let conn = ClientConnection::new(Arc::clone(tls), server_name)
        .map_err(|e| PrinterError::Tls(e.to_string()))?;

    Ok(StreamOwned::new(conn, sock))
}

pub(crate) struct FtpsClient {
    control: BufReader<TlsStream>,
    host: String,
    tls: Arc<ClientConfig>,
    timeout: Duration,
}

impl FtpsClient {
    pub fn connect(
        host: &str,
        tls: Arc<ClientConfig>,
        timeout: Duration,
    ) -> Result<Self, PrinterError> {
        tracing::debug!(host, port = FTPS_PORT, "Connecting to printer FTPS server");
        let stream = open_tls(host, FTPS_PORT, &tls, timeout)?;
        let mut client = Self {
            control: BufReader::new(stream),
            host: host.to_string(),
            tls,
            timeout,
        };

        let greeting = read_reply(&mut client.control)?;
        if greeting.code != 220 {
            return Err(PrinterError::Ftp(greeting.text));
        }

        Ok(client)
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<(), PrinterError> {
        let reply = self.command(&format!("USER {user}"))?;
        match reply.code {
            230 => Ok(()),
            331 => self.expect(&format!("PASS {password}"), &[230]).map(|_| ()),
            _ => Err(PrinterError::Ftp(reply.text)),
        }
    }

    /// Store `reader` as `name` and return the server's final transfer reply.
    pub fn put(&mut self, name: &str, reader: &mut dyn Read) -> Result<Reply, PrinterError> {
        self.expect("TYPE I", &[200])?;
        self.expect("PBSZ 0", &[200])?;
        self.expect("PROT P", &[200])?;
        let passive = self.expect("PASV", &[227])?;
        let port = parse_pasv_port(&passive.text)?;

        let mut data = open_tls(&self.host, port, &self.tls, self.timeout)?;
        self.expect(&format!("STOR {name}"), &[125, 150])?;

        let bytes = io::copy(reader, &mut data)?;
        data.conn.send_close_notify();
        data.flush()?;
        if let Err(e) = data.sock.shutdown(Shutdown::Both) {
            tracing::debug!("Ignoring error while closing FTPS data channel: {}", e);
        }
        drop(data);
        tracing::debug!(bytes, name, "Sent file over FTPS data channel");

        read_reply(&mut self.control)
    }

    pub fn quit(mut self) -> Result<(), PrinterError> {
        self.command("QUIT").map(|_| ())
    }

    fn command(&mut self, line: &str) -> Result<Reply, PrinterError> {
        if line.starts_with("PASS ") {
            tracing::trace!("FTP command: PASS ****");
        } else {
            tracing::trace!("FTP command: {}", line);
        }

        let stream = self.control.get_mut();
        stream.write_all(format!("{line}\r\n").as_bytes())?;
        stream.flush()?;

        read_reply(&mut self.control)
    }

    fn expect(&mut self, line: &str, codes: &[u16]) -> Result<Reply, PrinterError> {
        let reply = self.command(line)?;
        if !codes.contains(&reply.code) {
            return Err(PrinterError::Ftp(reply.text));
        }
        Ok(reply)
    }
}
