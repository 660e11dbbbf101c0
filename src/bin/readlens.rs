//! readlens CLI - offline analysis of recorded gaze sessions
//!
//! Commands:
//! - metrics: compute the full metric set from a recorded session file
//! - heatmap: generate per-passage attention heatmaps
//! - analyze: classify reading strategy from a recorded session
//! - doctor: diagnose engine version and input plumbing

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use readlens::analysis::{analyze_reading_strategy, TemplateNarrativeGenerator};
use readlens::heatmap::generate_heatmaps;
use readlens::metrics::compute_metrics;
use readlens::types::{GazeChunk, VisionConfig};
use readlens::ENGINE_VERSION;

/// readlens - gaze-tracking reading-test analysis
#[derive(Parser)]
#[command(name = "readlens")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Analyze recorded gaze-tracking reading sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute reading-behavior metrics from a recorded session
    Metrics {
        /// Recorded session file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,
    },

    /// Generate per-passage attention heatmaps
    Heatmap {
        /// Recorded session file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,
    },

    /// Classify reading strategy and produce a narrative
    Analyze {
        /// Recorded session file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Student grade level
        #[arg(long, default_value = "3")]
        grade: u8,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,
    },

    /// Diagnose engine version and input plumbing
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// On-disk shape of a recorded session, as exported by the capture client
#[derive(Deserialize)]
struct RecordedSession {
    vision_session_id: String,
    config: VisionConfig,
    chunks: Vec<GazeChunk>,
    #[serde(default)]
    comprehension_accuracy: Option<f64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ReadlensCliError> {
    match cli.command {
        Commands::Metrics { input, format } => cmd_metrics(&input, format),
        Commands::Heatmap { input, format } => cmd_heatmap(&input, format),
        Commands::Analyze {
            input,
            grade,
            format,
        } => cmd_analyze(&input, grade, format),
        Commands::Doctor { json } => cmd_doctor(json),
    }
}

fn read_session(input: &PathBuf) -> Result<RecordedSession, ReadlensCliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };
    let session: RecordedSession = serde_json::from_str(&data)?;
    if session.chunks.is_empty() {
        return Err(ReadlensCliError::NoGazeData);
    }
    Ok(session)
}

fn write_output<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<(), ReadlensCliError> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{out}");
    Ok(())
}

fn cmd_metrics(input: &PathBuf, format: OutputFormat) -> Result<(), ReadlensCliError> {
    let session = read_session(input)?;
    let points: Vec<_> = session
        .chunks
        .iter()
        .flat_map(|c| c.points.iter().cloned())
        .collect();
    let metrics = compute_metrics(
        &session.vision_session_id,
        &points,
        &session.config,
        session.comprehension_accuracy,
    )?;
    write_output(&metrics, format)
}

fn cmd_heatmap(input: &PathBuf, format: OutputFormat) -> Result<(), ReadlensCliError> {
    let session = read_session(input)?;
    let maps = generate_heatmaps(&session.chunks);
    write_output(&maps, format)
}

fn cmd_analyze(input: &PathBuf, grade: u8, format: OutputFormat) -> Result<(), ReadlensCliError> {
    let session = read_session(input)?;
    let points: Vec<_> = session
        .chunks
        .iter()
        .flat_map(|c| c.points.iter().cloned())
        .collect();
    let metrics = compute_metrics(
        &session.vision_session_id,
        &points,
        &session.config,
        session.comprehension_accuracy,
    )?;
    let analysis = analyze_reading_strategy(
        &metrics,
        grade,
        session.comprehension_accuracy,
        &TemplateNarrativeGenerator,
    );
    write_output(&analysis, format)
}

fn cmd_doctor(json: bool) -> Result<(), ReadlensCliError> {
    let stdin_mode = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (streaming input ready)"
    };

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks: vec![
            DoctorCheck {
                name: "engine_version".to_string(),
                message: format!("readlens {ENGINE_VERSION}"),
            },
            DoctorCheck {
                name: "stdin".to_string(),
                message: stdin_mode.to_string(),
            },
        ],
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("readlens Doctor Report");
        println!("======================");
        println!("Version: {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            println!("  [OK] {}: {}", check.name, check.message);
        }
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum ReadlensCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Engine(readlens::VisionError),
    NoGazeData,
}

impl From<io::Error> for ReadlensCliError {
    fn from(e: io::Error) -> Self {
        ReadlensCliError::Io(e)
    }
}

impl From<serde_json::Error> for ReadlensCliError {
    fn from(e: serde_json::Error) -> Self {
        ReadlensCliError::Json(e)
    }
}

impl From<readlens::VisionError> for ReadlensCliError {
    fn from(e: readlens::VisionError) -> Self {
        ReadlensCliError::Engine(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ReadlensCliError> for CliError {
    fn from(e: ReadlensCliError) -> Self {
        match e {
            ReadlensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ReadlensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the recorded session JSON syntax".to_string()),
            },
            ReadlensCliError::Engine(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: None,
            },
            ReadlensCliError::NoGazeData => CliError {
                code: "NO_GAZE_DATA".to_string(),
                message: "Recorded session contains no gaze chunks".to_string(),
                hint: Some("Ensure the capture client exported at least one chunk".to_string()),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    message: String,
}
