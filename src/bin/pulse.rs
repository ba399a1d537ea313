//! Pulse CLI - Command-line interface for Aigis Pulse
//!
//! Commands:
//! - replay: Replay recorded events offline and print the resulting patterns
//! - run: Run the live pattern service over events streamed on stdin
//! - status: Print the persisted current pattern and history
//! - config: Print the effective configuration
//! - classify: Send a captured frame to the classifier backend
//! - doctor: Diagnose configuration, storage and endpoints

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use aigis_pulse::behavior::adapter::{parse_array, parse_event, parse_ndjson};
use aigis_pulse::behavior::replay::replay;
use aigis_pulse::behavior::types::{DetectionCategory, Pattern};
use aigis_pulse::classifier::{ClassifierClient, FrameAnalyzer};
use aigis_pulse::config::DEFAULT_CLASSIFIER_URL;
use aigis_pulse::monitor::ActivityLogger;
use aigis_pulse::{
    EndpointSettings, JsonFileStore, KeyValueStore, MemoryStore, PatternBus, PatternConfig,
    PatternService, PatternStore, PulseError, PRODUCER_NAME, PULSE_VERSION,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pulse - Behavior pattern aggregation for Aigis
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "Aigis Team")]
#[command(version = PULSE_VERSION)]
#[command(about = "Turn browsing signals into doomscroll and violence patterns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded events using their own timestamps
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Pattern configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Run the live service over NDJSON events on stdin
    Run {
        /// Pattern configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Persist patterns to this JSON file (in-memory when omitted)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Flush output after each update
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Print the persisted current pattern and history
    Status {
        /// Pattern store file
        #[arg(long)]
        store: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Pattern configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Classify a captured JPEG frame and print detection events
    Classify {
        /// JPEG frame to analyze
        #[arg(short, long)]
        frame: PathBuf,

        /// Page the frame was captured on
        #[arg(long)]
        url: Option<String>,

        /// Detectors to run (all when omitted)
        #[arg(long, value_enum)]
        detector: Vec<Detector>,
    },

    /// Diagnose configuration, storage and endpoints
    Doctor {
        /// Pattern configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pattern store file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one pattern per line)
    Ndjson,
    /// JSON array of patterns
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum Detector {
    Violence,
    Nudity,
    Deepfake,
    Brainrot,
    Flash,
}

impl From<Detector> for DetectionCategory {
    fn from(d: Detector) -> Self {
        match d {
            Detector::Violence => DetectionCategory::Violence,
            Detector::Nudity => DetectionCategory::Nudity,
            Detector::Deepfake => DetectionCategory::Deepfake,
            Detector::Brainrot => DetectionCategory::Brainrot,
            Detector::Flash => DetectionCategory::Flash,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
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

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aigis_pulse=warn,pulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            config,
            output_format,
        } => cmd_replay(&input, input_format, config.as_deref(), output_format),

        Commands::Run {
            config,
            store,
            flush,
        } => cmd_run(config.as_deref(), store, flush),

        Commands::Status { store } => cmd_status(&store),

        Commands::Config { config } => cmd_config(config.as_deref()),

        Commands::Classify {
            frame,
            url,
            detector,
        } => cmd_classify(&frame, url.as_deref(), &detector),

        Commands::Doctor {
            config,
            store,
            json,
        } => cmd_doctor(config.as_deref(), store.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), PulseCliError> {
    let config = load_config(config)?;
    let input_data = read_input(input)?;

    let parsed = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data),
        InputFormat::Json => parse_array(&input_data)?,
    };
    if parsed.dropped > 0 {
        tracing::warn!(dropped = parsed.dropped, "skipped malformed events");
    }
    if parsed.events.is_empty() {
        return Err(PulseCliError::NoEvents);
    }

    let report = replay(config, &parsed.events);
    let mut patterns = report.patterns;
    patterns.extend(report.final_pattern);

    print!("{}", format_output(&patterns, &output_format)?);
    Ok(())
}

fn cmd_run(
    config: Option<&Path>,
    store: Option<PathBuf>,
    flush: bool,
) -> Result<(), PulseCliError> {
    let config = load_config(config)?;
    let settings = EndpointSettings::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_service(config, settings, store, flush))
}

async fn run_service(
    config: PatternConfig,
    settings: EndpointSettings,
    store: Option<PathBuf>,
    flush: bool,
) -> Result<(), PulseCliError> {
    let store: Arc<dyn KeyValueStore> = match store {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let bus = PatternBus::default();
    let mut updates = bus.subscribe();

    let (service, handle) = PatternService::new(config, store, bus);
    let service = match ActivityLogger::from_settings(&settings).map_err(PulseError::from)? {
        Some(logger) => {
            tracing::info!(url = logger.url(), "activity logging enabled");
            service.with_activity_logger(logger)
        }
        None => service,
    };
    let service_task = tokio::spawn(service.run());

    // Ends once the service, and with it the last bus sender, is gone
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            match updates.recv().await {
                Ok(update) => {
                    let line = match update.to_json() {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode pattern update");
                            continue;
                        }
                    };
                    stdout.write_all(line.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    if flush {
                        stdout.flush().await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind, updates skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        stdout.flush().await
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut dropped = 0usize;
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event(trimmed) {
            Ok(event) => handle.ingest(event).await?,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed event");
                dropped += 1;
            }
        }
    }

    tracing::info!(dropped, "input closed, stopping");
    handle.shutdown();
    service_task
        .await
        .map_err(|e| PulseCliError::Task(e.to_string()))?;
    printer
        .await
        .map_err(|e| PulseCliError::Task(e.to_string()))??;

    Ok(())
}

fn cmd_status(store: &Path) -> Result<(), PulseCliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let store = PatternStore::new(JsonFileStore::new(store));
    let (current, history) = runtime.block_on(async {
        let current = store.load_current().await?;
        let history = store.load_history().await?;
        Ok::<_, PulseError>((current, history))
    })?;

    let status = StatusReport {
        producer: PRODUCER_NAME.to_string(),
        current_pattern: current,
        patterns: history,
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn cmd_config(config: Option<&Path>) -> Result<(), PulseCliError> {
    let config = load_config(config)?;
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_classify(
    frame: &Path,
    url: Option<&str>,
    detectors: &[Detector],
) -> Result<(), PulseCliError> {
    let settings = EndpointSettings::from_env()?;
    let bytes = fs::read(frame)?;

    let client = ClassifierClient::from_settings(&settings).map_err(PulseError::from)?;
    let mut analyzer = if detectors.is_empty() {
        FrameAnalyzer::new(client)
    } else {
        FrameAnalyzer::with_categories(client, detectors.iter().map(|d| (*d).into()).collect())
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let events = runtime.block_on(analyzer.analyze(&bytes, url, chrono::Utc::now()));

    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    store: Option<&Path>,
    json: bool,
) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pulse version {}", PULSE_VERSION),
    });

    // Configuration
    checks.push(match config {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        },
        Some(path) => match load_config(Some(path)) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (rollover every {}s, {:?} policy)",
                    config.rollover().num_seconds(),
                    config.status_policy
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        },
    });

    // Pattern store
    if let Some(path) = store {
        checks.push(check_store(path));
    }

    // Remote endpoints
    match EndpointSettings::from_env() {
        Ok(settings) => {
            checks.push(DoctorCheck {
                name: "classifier".to_string(),
                status: if settings.classifier_url == DEFAULT_CLASSIFIER_URL {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: format!("Classifier backend at {}", settings.classifier_url),
            });
            checks.push(match &settings.monitor_url {
                Some(url) => DoctorCheck {
                    name: "monitor".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Activity log to {} as child {}", url, settings.child_id),
                },
                None => DoctorCheck {
                    name: "monitor".to_string(),
                    status: CheckStatus::Warning,
                    message: "AIGIS_MONITOR_URL not set, activity logging disabled".to_string(),
                },
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "endpoints".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_store(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: "Store file does not exist yet".to_string(),
        };
    }

    let loaded = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(PulseError::from)
        .and_then(|runtime| {
            let store = PatternStore::new(JsonFileStore::new(path));
            runtime
                .block_on(store.load_history())
                .map_err(PulseError::from)
        });

    match loaded {
        Ok(history) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Ok,
            message: format!("Store readable ({} closed windows)", history.len()),
        },
        Err(e) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read store: {}", e),
        },
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<PatternConfig, PulseCliError> {
    match path {
        Some(path) => Ok(PatternConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(PatternConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, PulseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn format_output(patterns: &[Pattern], format: &OutputFormat) -> Result<String, PulseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for pattern in patterns {
                lines.push(serde_json::to_string(pattern)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(patterns)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(patterns)?),
    }
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pulse(PulseError),
    Json(serde_json::Error),
    NoEvents,
    DoctorFailed,
    Task(String),
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<PulseError> for PulseCliError {
    fn from(e: PulseError) -> Self {
        PulseCliError::Pulse(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Pulse(PulseError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'pulse config' to see the accepted fields".to_string()),
            },
            PulseCliError::Pulse(PulseError::Storage(e)) => CliError {
                code: "STORAGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the store file is a JSON object".to_string()),
            },
            PulseCliError::Pulse(PulseError::Remote(e)) => CliError {
                code: "REMOTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Check AIGIS_CLASSIFIER_URL / AIGIS_MONITOR_URL and that the backend is up"
                        .to_string(),
                ),
            },
            PulseCliError::Pulse(e) => CliError {
                code: "PULSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure events match the documented event kinds".to_string()),
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No valid events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            PulseCliError::Task(msg) => CliError {
                code: "TASK_FAILED".to_string(),
                message: msg,
                hint: None,
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    producer: String,
    current_pattern: Option<Pattern>,
    patterns: Vec<Pattern>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
