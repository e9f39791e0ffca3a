//! PDF→DOCX conversion engines, tried in order until one succeeds.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use zip::write::SimpleFileOptions;

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::markup::escape;

/// Environment variable naming the office binary to use.
pub const OFFICE_BINARY_ENV: &str = "RELAYOUT_SOFFICE";
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound for each external engine subprocess.
    pub timeout: Duration,
    /// Explicit office binary; otherwise `RELAYOUT_SOFFICE`, then `PATH` and
    /// the usual install locations are probed.
    pub office_binary: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timeout: DEFAULT_ENGINE_TIMEOUT,
            office_binary: None,
        }
    }
}

pub trait ConversionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Convert `input` (PDF) to `output` (DOCX). Failures that should let the
    /// next engine run are `Error::EngineUnavailable`; `Error::Cancelled`
    /// stops the chain.
    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error>;
}

/// Run a subprocess to completion, killing it on timeout or cancellation.
fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    cancel: &CancelFlag,
    engine: &str,
) -> Result<(), Error> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::engine(engine, format!("failed to start: {e}")))?;
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(Error::engine(engine, format!("exited with {status}")));
            }
            Ok(None) => {}
            Err(e) => return Err(Error::engine(engine, format!("wait failed: {e}"))),
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::engine(
                engine,
                format!("timed out after {}s", timeout.as_secs_f32()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Move a file, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

/// Microsoft Word automation through PowerShell. Windows only.
pub struct WordEngine {
    timeout: Duration,
}

impl WordEngine {
    pub fn new(config: &EngineConfig) -> Self {
        WordEngine {
            timeout: config.timeout,
        }
    }
}

fn powershell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

impl ConversionEngine for WordEngine {
    fn name(&self) -> &str {
        "word"
    }

    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
        if !cfg!(windows) {
            return Err(Error::engine(self.name(), "only available on Windows"));
        }
        let input = std::path::absolute(input)?;
        let output = std::path::absolute(output)?;
        // 16 = wdFormatDocumentDefault
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             $word = New-Object -ComObject Word.Application; \
             try {{ $word.Visible = $false; $word.DisplayAlerts = 0; \
             $doc = $word.Documents.Open({}); $doc.SaveAs2({}, 16); $doc.Close($false) }} \
             finally {{ $word.Quit() }}",
            powershell_quote(&input),
            powershell_quote(&output)
        );
        let mut command = Command::new("powershell");
        command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
        run_with_timeout(command, self.timeout, cancel, self.name())?;
        if !output.is_file() {
            return Err(Error::engine(self.name(), "no output produced"));
        }
        Ok(())
    }
}

/// LibreOffice headless conversion.
pub struct OfficeEngine {
    binary: Option<PathBuf>,
    timeout: Duration,
}

const OFFICE_NAMES: [&str; 2] = ["soffice", "libreoffice"];

const OFFICE_INSTALL_PATHS: [&str; 5] = [
    r"C:\Program Files\LibreOffice\program\soffice.exe",
    r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    "/usr/lib/libreoffice/program/soffice",
    "/opt/libreoffice/program/soffice",
];

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX)))
        .find(|candidate| candidate.is_file())
}

fn locate_office(config: &EngineConfig) -> Option<PathBuf> {
    if let Some(binary) = &config.office_binary {
        return Some(binary.clone());
    }
    if let Some(binary) = std::env::var_os(OFFICE_BINARY_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(binary));
    }
    OFFICE_NAMES
        .iter()
        .find_map(|name| find_on_path(name))
        .or_else(|| {
            OFFICE_INSTALL_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
        })
}

impl OfficeEngine {
    pub fn new(config: &EngineConfig) -> Self {
        OfficeEngine {
            binary: locate_office(config),
            timeout: config.timeout,
        }
    }
}

impl ConversionEngine for OfficeEngine {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
        let Some(binary) = &self.binary else {
            return Err(Error::engine(self.name(), "no LibreOffice installation found"));
        };
        let out_dir = tempfile::tempdir()?;
        let mut command = Command::new(binary);
        command
            .args(["--headless", "--convert-to", "docx", "--outdir"])
            .arg(out_dir.path())
            .arg(input);
        log::debug!("running {}", binary.display());
        run_with_timeout(command, self.timeout, cancel, self.name())?;

        let stem = input
            .file_stem()
            .ok_or_else(|| Error::engine(self.name(), "input has no file name"))?;
        let produced = out_dir
            .path()
            .join(format!("{}.docx", stem.to_string_lossy()));
        if !produced.is_file() {
            return Err(Error::engine(self.name(), "no output produced"));
        }
        move_file(&produced, output)?;
        Ok(())
    }
}

/// In-process fallback: per-page text from the PDF written as a plain DOCX,
/// one paragraph per text line and a page break between pages.
#[derive(Default)]
pub struct TextFallbackEngine;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const PAGE_BREAK_PARAGRAPH: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Characters XML 1.0 cannot carry are dropped; tabs become spaces.
fn xml_safe(line: &str) -> String {
    let cleaned: String = line
        .chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|&c| !c.is_control() && c != '\u{FFFE}' && c != '\u{FFFF}')
        .collect();
    escape(&cleaned)
}

pub(crate) fn text_document_xml(pages: &[String]) -> String {
    let mut body = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            body.push_str(PAGE_BREAK_PARAGRAPH);
        }
        for line in page.lines() {
            let text = xml_safe(line.trim_end());
            if text.is_empty() {
                body.push_str("<w:p/>");
            } else {
                body.push_str(&format!(
                    r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
                ));
            }
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

fn write_text_docx(output: &Path, document_xml: &str) -> Result<(), Error> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = zip::ZipWriter::new(temp.as_file_mut());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in [
            ("[Content_Types].xml", CONTENT_TYPES_XML),
            ("_rels/.rels", ROOT_RELS_XML),
            ("word/document.xml", document_xml),
        ] {
            writer.start_file(name, options)?;
            writer.write_all(data.as_bytes())?;
        }
        writer.finish()?;
    }
    temp.persist(output).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl ConversionEngine for TextFallbackEngine {
    fn name(&self) -> &str {
        "text-fallback"
    }

    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> Result<(), Error> {
        let doc = lopdf::Document::load(input)
            .map_err(|e| Error::engine(self.name(), format!("cannot read PDF: {e}")))?;
        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            cancel.check()?;
            let text = doc.extract_text(&[*page_number]).unwrap_or_else(|e| {
                log::debug!("no text on page {page_number}: {e}");
                String::new()
            });
            pages.push(text);
        }
        cancel.check()?;
        write_text_docx(output, &text_document_xml(&pages))
    }
}

/// Ordered engines; the first success wins.
pub struct EngineChain {
    engines: Vec<Box<dyn ConversionEngine>>,
}

impl EngineChain {
    pub fn new(engines: Vec<Box<dyn ConversionEngine>>) -> Self {
        EngineChain { engines }
    }

    /// Word (Windows), then LibreOffice, then the text fallback.
    pub fn standard(config: &EngineConfig) -> Self {
        let mut engines: Vec<Box<dyn ConversionEngine>> = Vec::new();
        if cfg!(windows) {
            engines.push(Box::new(WordEngine::new(config)));
        }
        engines.push(Box::new(OfficeEngine::new(config)));
        engines.push(Box::new(TextFallbackEngine));
        EngineChain { engines }
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Run the engines in order and return the name of the one that
    /// succeeded. Cancellation stops the chain at once.
    pub fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag) -> Result<String, Error> {
        let mut failures: Vec<(String, String)> = Vec::new();
        for engine in &self.engines {
            cancel.check()?;
            let t0 = Instant::now();
            match engine.convert(input, output, cancel) {
                Ok(()) => {
                    log::info!(
                        "engine {} converted {} in {:.1}ms",
                        engine.name(),
                        input.display(),
                        t0.elapsed().as_secs_f64() * 1000.0
                    );
                    return Ok(engine.name().to_string());
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    log::warn!("engine {} failed: {e}", engine.name());
                    let reason = match e {
                        Error::EngineUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    failures.push((engine.name().to_string(), reason));
                }
            }
        }
        Err(Error::EnginesExhausted(failures))
    }
}
