use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use relayout::worker::{ConversionJob, ConversionStatus, spawn_conversion};
use relayout::{CancelFlag, Conversion, Error};

/// Re-render DOCX/XLSX files as PDF, or convert PDF to DOCX.
#[derive(Parser, Debug)]
#[command(name = "relayout", version, about, long_about = None)]
struct Args {
    /// Input file (.docx, .xlsx or .pdf)
    input: PathBuf,

    /// Output file [default: <input stem>_converted.<pdf|docx> next to the input]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the spacing cleanup after PDF→DOCX
    #[arg(long)]
    no_cleanup: bool,

    /// Seconds each external PDF→DOCX engine may run
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    engine_timeout: u64,
}

/// Set `cancel` on the first Ctrl-C. The listener thread lives until exit.
fn cancel_on_ctrl_c(cancel: CancelFlag) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("relayout-ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Ctrl-C received, cancelling");
                    cancel.cancel();
                }
            })
        })?;
    Ok(())
}

fn run(args: Args) -> Result<ConversionStatus, Error> {
    let mut conversion = Conversion::from_paths(args.input, args.output)?;
    conversion.cleanup = !args.no_cleanup;
    conversion.engine.timeout = Duration::from_secs(args.engine_timeout);

    let job = ConversionJob::new(conversion);
    if let Err(e) = cancel_on_ctrl_c(job.cancel.clone()) {
        log::warn!("Ctrl-C will not cancel the conversion: {e}");
    }
    spawn_conversion(job)?.wait()
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(ConversionStatus::Completed(output)) => {
            println!("{}", output.display());
            ExitCode::SUCCESS
        }
        Ok(ConversionStatus::Cancelled) => {
            eprintln!("Conversion cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
