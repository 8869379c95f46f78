use anyhow::Result;
use clap::{ArgAction, ColorChoice, Parser, ValueHint};
use std::ffi::OsString;
use std::fmt::Display;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::Level;

mod dispatch;
mod error;
mod printer;
mod report;
mod settings;
mod types;

use crate::settings::Settings;

/// Forward a sliced .3mf print file to a Bambu Lab printer on the local network.
///
/// Every option can be provided through its environment variable.{n}
/// Supported modes:{n}
///   * stub - report the inputs, touch nothing{n}
///   * copy - copy the file into a local outbox{n}
///   * bambulabs_api - upload to the printer and start the print
#[derive(clap::Parser, Debug)]
#[clap(author, about, version, name = "Bambu Adapter", color=ColorChoice::Auto)]
pub(crate) struct Cli {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, action=ArgAction::Count)]
    verbose: u8,
    /// Printer IP address
    #[clap(long, env = "BAMBU_IP_ADDRESS")]
    pub ip_address: Option<String>,
    /// Printer serial number
    #[clap(long, env = "BAMBU_SERIAL_NUMBER")]
    pub serial_number: Option<String>,
    /// LAN access code shown on the printer
    #[clap(long, env = "BAMBU_ACCESS_CODE", hide_env_values = true)]
    pub access_code: Option<String>,
    /// File name the job is stored under on the printer
    #[clap(long, env = "BAMBU_FILE_NAME")]
    pub file_name: Option<String>,
    /// Local .3mf file to dispatch
    #[clap(long, env = "BAMBU_FILE_PATH", value_hint=ValueHint::FilePath)]
    pub file_path: Option<String>,
    /// Dispatch settings
    #[clap(flatten)]
    pub dispatch: DispatchSettings,
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct DispatchSettings {
    /// Dispatch mode: stub, copy or bambulabs_api
    #[clap(long, env = "BAMBU_ADAPTER_MODE", default_value = "stub")]
    pub mode: String,
    /// Outbox directory used by the copy mode
    #[clap(long, env = "BAMBU_ADAPTER_COPY_DIR", value_hint=ValueHint::DirPath, default_value = "uploads/bambu-adapter-outbox")]
    pub copy_dir: String,
    /// Plate number (or plate gcode path) inside the .3mf project
    #[clap(long, env = "BAMBU_ADAPTER_PLATE_NUMBER", default_value = "1")]
    pub plate_number: String,
    /// Use the AMS for filament feeding ("true" to enable)
    #[clap(long, env = "BAMBU_ADAPTER_USE_AMS", default_value = "true")]
    pub use_ams: String,
    /// Run flow calibration before printing ("true" to enable)
    #[clap(long, env = "BAMBU_ADAPTER_FLOW_CALIBRATION", default_value = "true")]
    pub flow_calibration: String,
    /// Comma separated AMS slot mapping, e.g. 0 or 0,1
    #[clap(long, env = "BAMBU_ADAPTER_AMS_MAPPING", default_value = "0")]
    pub ams_mapping: String,
    /// Seconds to wait after connecting before talking to the printer
    #[clap(long, env = "BAMBU_ADAPTER_CONNECT_SETTLE_SECONDS", default_value = "2")]
    pub connect_settle_seconds: String,
}

fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Logging goes to stderr, stdout is reserved for the JSON report
    let installed = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .try_init();
    if let Err(e) = installed {
        tracing::debug!("Keeping existing log subscriber: {}", e);
    }
}

fn run(args: Cli, out: &mut impl Write) -> Result<()> {
    let settings = Settings::from_cli(&args)?;
    tracing::debug!(
        file = %settings.file_path.display(),
        mode = %settings.mode,
        "Validated adapter settings"
    );

    let report = dispatch::run(&settings)?;
    writeln!(out, "{}", report.to_json()?)?;

    Ok(())
}

/// First line of a clap error without its `error: ` prefix.
fn parse_error_line(e: &clap::Error) -> String {
    let rendered = e.to_string();
    let line = rendered.lines().next().unwrap_or_default().trim();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

fn fail(err: &mut impl Write, message: impl Display) -> u8 {
    let _result = writeln!(err, "{message}");
    1
}

/// Parse `argv` and run the adapter, returning the process exit status.
///
/// The report is the only output on `out`. Any failure, including a rejected
/// argument, is a single line on `err` and exit status 1.
fn execute<I, T>(argv: I, out: &mut impl Write, err: &mut impl Write) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Cli::try_parse_from(argv) {
        Ok(args) => args,
        // --help and --version
        Err(e) if !e.use_stderr() => {
            let _result = write!(out, "{e}");
            return 0;
        }
        Err(e) => return fail(err, parse_error_line(&e)),
    };
    setup_logging(args.verbose);

    match run(args, out) {
        Ok(_) => 0,
        Err(e) => fail(err, e),
    }
}

fn main() -> ExitCode {
    let status = execute(std::env::args_os(), &mut io::stdout(), &mut io::stderr());
    ExitCode::from(status)
}
