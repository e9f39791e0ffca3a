//! Runs one conversion on a dedicated thread so callers stay responsive and
//! can cancel it.

use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::Conversion;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionStatus {
    /// The output file was written.
    Completed(PathBuf),
    /// The conversion was stopped; no output file is left behind.
    Cancelled,
}

/// A conversion plus the flag that cancels it. Each job gets a fresh flag
/// unless one is supplied.
#[derive(Clone, Debug)]
pub struct ConversionJob {
    pub conversion: Conversion,
    pub cancel: CancelFlag,
}

impl ConversionJob {
    pub fn new(conversion: Conversion) -> Self {
        ConversionJob {
            conversion,
            cancel: CancelFlag::new(),
        }
    }
}

impl From<Conversion> for ConversionJob {
    fn from(conversion: Conversion) -> Self {
        ConversionJob::new(conversion)
    }
}

pub struct ConversionHandle {
    cancel: CancelFlag,
    thread: JoinHandle<Result<ConversionStatus, Error>>,
}

impl ConversionHandle {
    /// Request cancellation; the worker stops at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the worker finishes.
    pub fn wait(self) -> Result<ConversionStatus, Error> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(Error::Io(io::Error::other("conversion worker panicked"))))
    }
}

/// Remove an output file this run wrote before it saw the cancellation.
pub(crate) fn discard_output(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => log::debug!("removed output of cancelled run {}", output.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("cannot remove output {}: {e}", output.display()),
    }
}

fn run_job(conversion: Conversion, cancel: CancelFlag) -> Result<ConversionStatus, Error> {
    match conversion.run(&cancel) {
        Ok(()) if cancel.is_cancelled() => {
            discard_output(&conversion.output);
            Ok(ConversionStatus::Cancelled)
        }
        Ok(()) => Ok(ConversionStatus::Completed(conversion.output)),
        // Outputs are persisted whole, so a cancelled run has nothing to remove.
        Err(Error::Cancelled) => Ok(ConversionStatus::Cancelled),
        Err(e) => {
            log::warn!("conversion of {} failed: {e}", conversion.input.display());
            Err(e)
        }
    }
}

pub fn spawn_conversion(job: ConversionJob) -> Result<ConversionHandle, Error> {
    let ConversionJob { conversion, cancel } = job;
    let worker_cancel = cancel.clone();
    let thread = thread::Builder::new()
        .name("relayout-worker".into())
        .spawn(move || run_job(conversion, worker_cancel))?;
    Ok(ConversionHandle { cancel, thread })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_cancelled_job_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        std::fs::write(&input, b"irrelevant").unwrap();
        let output = dir.path().join("out.pdf");

        let job = ConversionJob::new(Conversion::from_paths(&input, Some(output.clone())).unwrap());
        job.cancel.cancel();
        let handle = spawn_conversion(job).unwrap();
        assert_eq!(handle.wait().unwrap(), ConversionStatus::Cancelled);
        assert!(!output.exists());
    }

    #[test]
    fn cancelled_job_keeps_a_file_it_did_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        std::fs::write(&input, b"irrelevant").unwrap();
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"earlier result").unwrap();

        let job = ConversionJob::new(Conversion::from_paths(&input, Some(output.clone())).unwrap());
        job.cancel.cancel();
        let handle = spawn_conversion(job).unwrap();
        assert_eq!(handle.wait().unwrap(), ConversionStatus::Cancelled);
        assert_eq!(std::fs::read(&output).unwrap(), b"earlier result");
    }

    #[test]
    fn failed_run_leaves_existing_output_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"earlier result").unwrap();
        let err = crate::convert_docx_bytes_to_pdf(b"not a zip", &output, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDocx(_)), "{err}");
        assert_eq!(std::fs::read(&output).unwrap(), b"earlier result");
    }

    #[test]
    fn failures_surface_from_wait() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.xlsx");
        std::fs::write(&input, b"not a zip").unwrap();
        let handle =
            spawn_conversion(Conversion::from_paths(&input, None).unwrap().into()).unwrap();
        assert!(handle.wait().is_err());
    }
}
