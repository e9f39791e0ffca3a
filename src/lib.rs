pub mod cancel;
pub mod cleanup;
pub mod docx;
pub mod engine;
mod error;
mod fonts;
pub mod images;
pub mod markup;
pub mod model;
pub mod pdf;
pub mod style;
pub mod table;
pub mod walker;
pub mod worker;
pub mod xlsx;

pub use cancel::CancelFlag;
pub use cleanup::{CleanupOutcome, cleanup_docx_spacing};
pub use engine::EngineConfig;
pub use error::Error;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use images::TempImages;
use model::{PageGeometry, RenderBlock};
use style::StyleResolver;

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Walk, render and write; the shared tail of every →PDF conversion.
fn write_pdf(
    blocks: &[RenderBlock],
    geometry: &PageGeometry,
    output: &Path,
    cancel: &CancelFlag,
) -> Result<usize, Error> {
    let bytes = pdf::render(blocks, geometry, cancel)?;
    cancel.check()?;
    persist_output(output, &bytes)?;
    Ok(bytes.len())
}

/// Write to a sibling temp file and rename it over `output`. The output path
/// is untouched unless the whole file was written.
fn persist_output(output: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.persist(output).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn render_document(
    doc: model::SourceDocument,
    output: &Path,
    cancel: &CancelFlag,
    t0: Instant,
) -> Result<(), Error> {
    let t_parse = t0.elapsed();

    let geometry = PageGeometry::docx_portrait();
    let mut temp = TempImages::new();
    let blocks = walker::walk_document(
        &doc,
        &geometry,
        &mut StyleResolver::new(),
        &mut temp,
        cancel,
    )?;
    let t_walk = t0.elapsed();

    let size = write_pdf(&blocks, &geometry, output, cancel)?;
    let t_total = t0.elapsed();
    temp.close();

    log::info!(
        "Timing: parse={:.1}ms, walk={:.1}ms, render+write={:.1}ms, total={:.1}ms (output {} bytes)",
        ms(t_parse),
        ms(t_walk - t_parse),
        ms(t_total - t_walk),
        ms(t_total),
        size,
    );
    Ok(())
}

pub fn convert_docx_to_pdf(input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
    let t0 = Instant::now();
    cancel.check()?;
    let doc = docx::parse(input)?;
    render_document(doc, output, cancel, t0)
}

pub fn convert_docx_bytes_to_pdf(
    input: &[u8],
    output: &Path,
    cancel: &CancelFlag,
) -> Result<(), Error> {
    let t0 = Instant::now();
    cancel.check()?;
    let doc = docx::parse_bytes(input)?;
    render_document(doc, output, cancel, t0)
}

pub fn convert_xlsx_to_pdf(input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
    let t0 = Instant::now();
    cancel.check()?;
    let workbook = xlsx::parse(input)?;
    let t_parse = t0.elapsed();

    let geometry = PageGeometry::sheet_landscape();
    let blocks = walker::walk_workbook(&workbook, &geometry, &mut StyleResolver::new(), cancel)?;
    let t_walk = t0.elapsed();

    let size = write_pdf(&blocks, &geometry, output, cancel)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms ({} sheets), walk={:.1}ms, render+write={:.1}ms, total={:.1}ms (output {} bytes)",
        ms(t_parse),
        workbook.sheets.len(),
        ms(t_walk - t_parse),
        ms(t_total - t_walk),
        ms(t_total),
        size,
    );
    Ok(())
}

/// PDF→DOCX through the standard engine chain, followed by the spacing
/// cleanup.
pub fn convert_pdf_to_docx(input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
    convert_pdf_to_docx_with(input, output, &EngineConfig::default(), true, cancel)
}

pub fn convert_pdf_to_docx_with(
    input: &Path,
    output: &Path,
    config: &EngineConfig,
    cleanup: bool,
    cancel: &CancelFlag,
) -> Result<(), Error> {
    let t0 = Instant::now();
    if !input.is_file() {
        return Err(Error::UnsupportedInput(format!(
            "{} does not exist",
            input.display()
        )));
    }
    let engine = engine::EngineChain::standard(config).convert(input, output, cancel)?;
    let t_engine = t0.elapsed();
    if let Err(e) = cancel.check() {
        worker::discard_output(output);
        return Err(e);
    }

    if cleanup {
        if let CleanupOutcome::Skipped(reason) = cleanup_docx_spacing(output) {
            log::debug!("cleanup skipped: {reason}");
        }
    }
    log::info!(
        "Timing: engine({engine})={:.1}ms, cleanup={:.1}ms",
        ms(t_engine),
        ms(t0.elapsed() - t_engine),
    );
    Ok(())
}

/// Direction of a conversion, picked from the input file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionKind {
    DocxToPdf,
    XlsxToPdf,
    PdfToDocx,
}

impl ConversionKind {
    pub fn for_input(input: &Path) -> Result<Self, Error> {
        let ext = input
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "docx" => Ok(ConversionKind::DocxToPdf),
            "xlsx" => Ok(ConversionKind::XlsxToPdf),
            "pdf" => Ok(ConversionKind::PdfToDocx),
            _ => Err(Error::UnsupportedInput(format!(
                "{}: expected a .docx, .xlsx or .pdf file",
                input.display()
            ))),
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            ConversionKind::DocxToPdf | ConversionKind::XlsxToPdf => "pdf",
            ConversionKind::PdfToDocx => "docx",
        }
    }
}

/// One fully specified conversion.
#[derive(Clone, Debug)]
pub struct Conversion {
    pub kind: ConversionKind,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Run the spacing cleanup after PDF→DOCX.
    pub cleanup: bool,
    pub engine: EngineConfig,
}

impl Conversion {
    /// `output` defaults to [`Conversion::default_output`].
    pub fn from_paths(input: impl Into<PathBuf>, output: Option<PathBuf>) -> Result<Self, Error> {
        let input = input.into();
        let kind = ConversionKind::for_input(&input)?;
        let output = match output {
            Some(output) => output,
            None => Self::default_output(&input)?,
        };
        Ok(Conversion {
            kind,
            input,
            output,
            cleanup: true,
            engine: EngineConfig::default(),
        })
    }

    /// `<dir>/<stem>_converted.<ext>` next to the input.
    pub fn default_output(input: &Path) -> Result<PathBuf, Error> {
        let kind = ConversionKind::for_input(input)?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(input.with_file_name(format!(
            "{stem}_converted.{}",
            kind.output_extension()
        )))
    }

    pub fn run(&self, cancel: &CancelFlag) -> Result<(), Error> {
        log::info!(
            "{:?}: {} -> {}",
            self.kind,
            self.input.display(),
            self.output.display()
        );
        match self.kind {
            ConversionKind::DocxToPdf => convert_docx_to_pdf(&self.input, &self.output, cancel),
            ConversionKind::XlsxToPdf => convert_xlsx_to_pdf(&self.input, &self.output, cancel),
            ConversionKind::PdfToDocx => convert_pdf_to_docx_with(
                &self.input,
                &self.output,
                &self.engine,
                self.cleanup,
                cancel,
            ),
        }
    }
}
