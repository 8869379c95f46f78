use crate::error::AdapterError;
use crate::printer::{PrinterClient, PrinterError, Session};
use crate::report::{
    CopyReport, PrintReport, Report, StubReport, COPY_MESSAGE, PRINT_MESSAGE, STUB_MESSAGE,
};
use crate::settings::Settings;
use crate::types::{Dispatch, Mode, PrintJob};

use std::fs::{create_dir_all, metadata, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub(crate) fn run(settings: &Settings) -> Result<Report, AdapterError> {
    let dispatch = settings.dispatch()?;
    tracing::info!(
        mode = %dispatch.mode(),
        "Dispatching {}",
        settings.file_path.display()
    );

    match dispatch {
        Dispatch::Stub => stub(settings),
        Dispatch::Copy { outbox } => copy(settings, &outbox),
        #[cfg(feature = "lan")]
        Dispatch::Printer(job) => {
            use crate::printer::bambu::{BambuConfig, BambuPrinter};

            let printer = BambuPrinter::new(BambuConfig::new(
                &settings.ip_address,
                &settings.access_code,
                settings.serial_number.as_deref(),
            ));
            print(printer, settings, &job)
        }
        #[cfg(not(feature = "lan"))]
        Dispatch::Printer(_) => Err(AdapterError::ClientUnavailable),
    }
}

fn stub(settings: &Settings) -> Result<Report, AdapterError> {
    let file_size_bytes = metadata(&settings.file_path)
        .map_err(|source| AdapterError::Stat {
            path: settings.file_path.clone(),
            source,
        })?
        .len();

    Ok(Report::Stub(StubReport {
        ok: true,
        mode: Mode::Stub,
        message: STUB_MESSAGE,
        ip_address: settings.ip_address.clone(),
        serial_number: settings.serial_number.clone(),
        file_name: settings.file_name.clone(),
        file_size_bytes,
    }))
}

fn copy(settings: &Settings, outbox: &Path) -> Result<Report, AdapterError> {
    let target = copy_to_outbox(&settings.file_path, outbox).map_err(AdapterError::Copy)?;
    tracing::info!("Copied {} to {}", settings.file_path.display(), target.display());

    Ok(Report::Copy(CopyReport {
        ok: true,
        mode: Mode::Copy,
        message: COPY_MESSAGE,
        target_path: target.display().to_string(),
    }))
}

/// Copy `src` into `outbox` under its own file name, keeping permissions and
/// modification time. An existing file with that name is replaced atomically.
pub(crate) fn copy_to_outbox(src: &Path, outbox: &Path) -> io::Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
    })?;
    create_dir_all(outbox)?;
    let target = outbox.join(name);

    let src_metadata = metadata(src)?;
    let mut reader = BufReader::new(File::open(src)?);
    let tempfile = NamedTempFile::new_in(outbox)?;

    let mut writer = BufWriter::new(tempfile.as_file());
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    drop(writer);

    tempfile.as_file().set_modified(src_metadata.modified()?)?;
    tempfile.as_file().set_permissions(src_metadata.permissions())?;
    tempfile.persist(&target).map_err(|e| e.error)?;

    Ok(target)
}

/// Upload the file and start the print through `printer`.
///
/// The printer is disconnected when this returns, on success and on every
/// error path.
pub(crate) fn print<P: PrinterClient>(
    printer: P,
    settings: &Settings,
    job: &PrintJob,
) -> Result<Report, AdapterError> {
    let mut session = Session::open(printer);
    session.connect()?;

    tracing::debug!("Waiting {:?} for the printer connection to settle", job.connect_settle);
    std::thread::sleep(job.connect_settle);

    let mut file = File::open(&settings.file_path).map_err(PrinterError::from)?;
    let upload_result = session
        .upload(&mut file, &settings.file_name)?
        .ok_or(AdapterError::UploadRejected)?;
    tracing::info!(upload_result, "Uploaded {}", settings.file_name);

    let start_result = session.start_print(&settings.file_name, job)?;
    if !start_result {
        return Err(AdapterError::StartRejected);
    }
    tracing::info!(
        plate = %job.plate_number,
        state = ?session.state(),
        "Started print of {}",
        settings.file_name
    );

    Ok(Report::Print(PrintReport {
        ok: true,
        mode: Mode::BambuLabsApi,
        message: PRINT_MESSAGE,
        ip_address: settings.ip_address.clone(),
        serial_number: settings.serial_number.clone(),
        file_name: settings.file_name.clone(),
        upload_result,
        start_result,
        plate_number: job.plate_number.clone(),
        use_ams: job.use_ams,
        ams_mapping: job.ams_mapping.clone(),
        flow_calibration: job.flow_calibration,
    }))
}
