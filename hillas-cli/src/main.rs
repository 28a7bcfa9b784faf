//! hillas-cli: Command-line driver for IACT image analysis.
//!
//! Reads a run description and a stream of array events (JSON), runs the
//! full camera pipeline and writes per-event results.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};
use hillas_algorithms::{process_events, EventResult, RunContext};
use hillas_core::{AnalysisConfig, ArrayEvent, RunSetup};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Analysis error: {0}")]
    Core(#[from] hillas_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Output format of the per-event results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// One JSON object per line
    Jsonl,
    /// A single JSON array
    Json,
    /// Shower summary table
    Csv,
}

impl Format {
    /// Format implied by a file extension.
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Image analysis and stereo reconstruction for Cherenkov telescope arrays.
#[derive(Parser)]
#[command(name = "hillas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the events of one run
    Process {
        /// Run description (JSON)
        #[arg(short, long)]
        run: PathBuf,

        /// Array events (JSON, one or more objects)
        #[arg(short, long)]
        events: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Analysis configuration (JSON); defaults apply otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format; guessed from the extension if omitted
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Events processed together
        #[arg(long, default_value = "1000")]
        batch_size: usize,

        /// Worker threads (0 = one per core)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the telescopes of a run and their derived camera properties
    Info {
        /// Run description (JSON)
        #[arg(short, long)]
        run: PathBuf,

        /// Analysis configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Counters of one processing pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    events: usize,
    images: usize,
    showers: usize,
}

fn read_run(path: &Path) -> Result<RunSetup> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn read_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

/// Writes results in the selected format.
struct ResultWriter<W: Write> {
    out: W,
    format: Format,
    written: usize,
}

impl<W: Write> ResultWriter<W> {
    fn new(out: W, format: Format) -> Result<Self> {
        let mut writer = Self {
            out,
            format,
            written: 0,
        };
        match format {
            Format::Json => writer.out.write_all(b"[\n")?,
            Format::Csv => writeln!(
                writer.out,
                "event_id,images,triggered,result_bits,azimuth_deg,altitude_deg,x_core_m,y_core_m,err_direction_deg,err_core_m,status"
            )?,
            Format::Jsonl => {}
        }
        Ok(writer)
    }

    fn write(&mut self, result: &EventResult) -> Result<()> {
        match self.format {
            Format::Jsonl => {
                serde_json::to_writer(&mut self.out, result)?;
                self.out.write_all(b"\n")?;
            }
            Format::Json => {
                if self.written > 0 {
                    self.out.write_all(b",\n")?;
                }
                serde_json::to_writer_pretty(&mut self.out, result)?;
            }
            Format::Csv => self.write_csv_row(result)?,
        }
        self.written += 1;
        Ok(())
    }

    fn write_csv_row(&mut self, result: &EventResult) -> Result<()> {
        let images = result.images.iter().filter(|i| i.is_known()).count();
        match (&result.shower, &result.shower_status) {
            (Some(shower), _) => writeln!(
                self.out,
                "{},{},{},{},{:.5},{:.5},{:.3},{:.3},{},{},ok",
                result.event_id,
                images,
                shower.num_triggered,
                shower.result_bits,
                shower.azimuth.to_degrees(),
                shower.altitude.to_degrees(),
                shower.x_core,
                shower.y_core,
                shower
                    .err_direction
                    .map_or_else(String::new, |e| format!("{:.5}", e.to_degrees())),
                shower.err_core.map_or_else(String::new, |e| format!("{:.3}", e)),
            )?,
            (None, status) => writeln!(
                self.out,
                "{},{},,0,,,,,,,\"{}\"",
                result.event_id,
                images,
                status
                    .as_ref()
                    .map_or_else(String::new, ToString::to_string)
            )?,
        }
        Ok(())
    }

    fn finish(mut self) -> Result<W> {
        if self.format == Format::Json {
            self.out.write_all(b"\n]\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Runs the pipeline over an event stream and writes every result.
fn process<R: std::io::Read, W: Write>(
    ctx: &RunContext,
    events: R,
    writer: &mut ResultWriter<W>,
    batch_size: usize,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut stream = serde_json::Deserializer::from_reader(events).into_iter::<ArrayEvent>();
    let batch_size = batch_size.max(1);
    loop {
        let mut batch = Vec::with_capacity(batch_size);
        for event in stream.by_ref().take(batch_size) {
            batch.push(event?);
        }
        if batch.is_empty() {
            break;
        }
        debug!("processing batch of {} events", batch.len());
        for result in process_events(ctx, batch)? {
            summary.events += 1;
            summary.images += result.images.iter().filter(|i| i.is_known()).count();
            summary.showers += usize::from(result.shower.is_some());
            writer.write(&result)?;
        }
    }
    Ok(summary)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            run,
            events,
            output,
            config,
            format,
            batch_size,
            threads,
            verbose,
        } => {
            init_logging(verbose);
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()?;
            }

            let config = read_config(config.as_deref())?;
            let ctx = RunContext::new(read_run(&run)?, config)?;
            let format = match format.or_else(|| Format::from_path(&output)) {
                Some(format) => format,
                None => {
                    warn!(
                        "Unknown extension for '{}', writing JSON lines",
                        output.display()
                    );
                    Format::Jsonl
                }
            };
            info!("Writing {:?} output to: {}", format, output.display());

            let start = Instant::now();
            let input = BufReader::new(File::open(&events)?);
            let mut writer = ResultWriter::new(BufWriter::new(File::create(&output)?), format)?;
            let summary = process(&ctx, input, &mut writer, batch_size)?;
            writer.finish()?;

            println!(
                "Processed {} events in {:.2}s",
                summary.events,
                start.elapsed().as_secs_f64()
            );
            println!("Images: {}", summary.images);
            println!("Showers: {}", summary.showers);
        }

        Commands::Info { run, config } => {
            init_logging(false);
            let config = read_config(config.as_deref())?;
            let ctx = RunContext::new(read_run(&run)?, config)?;
            let reference = ctx.reference();

            println!("Run: {}", ctx.run_id());
            println!(
                "Reference: az {:.3} deg, alt {:.3} deg",
                reference.azimuth.to_degrees(),
                reference.altitude.to_degrees()
            );
            println!(
                "{:<6} | {:<5} | {:<7} | {:<8} | {:<10} | {:<10} | {:<24}",
                "CT", "Type", "Pixels", "Disabled", "R_eff(deg)", "R_max(deg)", "Position (m)"
            );
            println!("{:-<88}", "");
            for camera in ctx.cameras() {
                let setup = camera.setup();
                let radius = camera.radius();
                println!(
                    "{:<6} | {:<5} | {:<7} | {:<8} | {:<10.3} | {:<10.3} | ({:.1}, {:.1}, {:.1})",
                    setup.tel_id,
                    setup.tel_type,
                    setup.camera.num_pixels(),
                    camera.disabled().count(),
                    radius.effective.to_degrees(),
                    radius.max.to_degrees(),
                    setup.position[0],
                    setup.position[1],
                    setup.position[2]
                );
            }
        }
    }

    Ok(())
}
