//! bandscore CLI - replay headband message logs through the engine
//!
//! Commands:
//! - transform: Replay a recorded message log into snapshots (batch mode)
//! - run: Process streaming messages from stdin (streaming mode)
//! - validate: Validate message addresses and payloads
//! - doctor: Diagnose configuration and state files
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bandscore::routing::{parse_array, parse_ndjson, validate_messages};
use bandscore::types::EngineSnapshot;
use bandscore::{BandEngine, EngineConfig, FrameReplayer, SampleMessage, PRODUCER_NAME, VERSION};

/// bandscore - adaptive per-band scores for EEG headband streams
#[derive(Parser)]
#[command(name = "bandscore")]
#[command(version = VERSION)]
#[command(about = "Turn headband band-power messages into normalized scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded message log into snapshots (batch mode)
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Process streaming messages from stdin (streaming mode)
    Run {
        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each snapshot
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate message addresses and payloads
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and state files
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a saved state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load engine state from file
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Save engine state to file after processing
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Include each band's recent samples in snapshots
    #[arg(long)]
    include_recent: bool,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one message per line)
    Ndjson,
    /// JSON array of messages
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one snapshot per line)
    Ndjson,
    /// JSON array of snapshots
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BandCliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            engine,
        } => cmd_transform(&input, &output, input_format, output_format, &engine),

        Commands::Run {
            output_format,
            flush,
            engine,
        } => cmd_run(output_format, flush, &engine),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            config,
            state,
            json,
        } => cmd_doctor(config.as_deref(), state.as_deref(), json),

        Commands::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn build_engine(args: &EngineArgs) -> Result<BandEngine, BandCliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    let mut engine = BandEngine::with_config(config)?;

    if let Some(state_path) = &args.load_state {
        let state_json = fs::read_to_string(state_path)?;
        engine.load_state(&state_json)?;
    }

    Ok(engine)
}

fn finish_engine(engine: &BandEngine, args: &EngineArgs) -> Result<(), BandCliError> {
    if let Some(state_path) = &args.save_state {
        fs::write(state_path, engine.save_state()?)?;
        info!("saved engine state to {}", state_path.display());
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String, BandCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_messages(data: &str, format: &InputFormat) -> Result<Vec<SampleMessage>, BandCliError> {
    Ok(match format {
        InputFormat::Ndjson => parse_ndjson(data)?,
        InputFormat::Json => parse_array(data)?,
    })
}

fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    args: &EngineArgs,
) -> Result<(), BandCliError> {
    let input_data = read_input(input)?;
    let messages = parse_messages(&input_data, &input_format)?;

    if messages.is_empty() {
        return Err(BandCliError::NoMessages);
    }

    let mut replayer = FrameReplayer::new(build_engine(args)?, args.include_recent);
    let mut snapshots: Vec<EngineSnapshot> = Vec::new();

    for message in &messages {
        if let Some(snapshot) = replayer.push(message)? {
            snapshots.push(snapshot);
        }
    }
    snapshots.extend(replayer.finish());

    info!(
        "replayed {} messages into {} cycles",
        messages.len(),
        snapshots.len()
    );

    finish_engine(replayer.engine(), args)?;

    let output_data = format_output(&snapshots, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(output_format: OutputFormat, flush: bool, args: &EngineArgs) -> Result<(), BandCliError> {
    let mut replayer = FrameReplayer::new(build_engine(args)?, args.include_recent);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let message: SampleMessage = serde_json::from_str(trimmed).map_err(|e| {
            BandCliError::ParseError(format!("Failed to parse message: {}", e))
        })?;

        if let Some(snapshot) = replayer.push(&message)? {
            write!(stdout, "{}", format_output(&[snapshot], &output_format)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    if let Some(snapshot) = replayer.finish() {
        write!(stdout, "{}", format_output(&[snapshot], &output_format)?)?;
        stdout.flush()?;
    }

    finish_engine(replayer.engine(), args)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), BandCliError> {
    let input_data = read_input(input)?;
    let messages = parse_messages(&input_data, &input_format)?;

    let failures = validate_messages(&messages);

    let report = ValidationReport {
        total_messages: messages.len(),
        valid_messages: messages.len() - failures.len(),
        invalid_messages: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                address: f.address.clone(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total messages:   {}", report.total_messages);
        println!("Valid messages:   {}", report.valid_messages);
        println!("Invalid messages: {}", report.invalid_messages);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} (index {}): {}", err.address, err.index, err.error);
            }
        }
    }

    if report.invalid_messages > 0 {
        Err(BandCliError::ValidationFailed(report.invalid_messages))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>, json: bool) -> Result<(), BandCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("bandscore version {}", VERSION),
    }];

    if let Some(config_path) = config {
        checks.push(check_file(config_path, "config", |content| {
            EngineConfig::from_json(content).map(|c| {
                format!(
                    "Config valid (history {}, window {}, cutoff {})",
                    c.statistic.history_capacity, c.statistic.window_capacity, c.statistic.cutoff
                )
            })
        }));
    }

    if let Some(state_path) = state {
        checks.push(check_file(state_path, "state", |content| {
            let mut engine = BandEngine::new();
            engine
                .load_state(content)
                .map(|()| format!("State valid (cycle {})", engine.cycle()))
        }));
    }

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
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("bandscore Doctor Report");
        println!("=======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(BandCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_file(
    path: &Path,
    name: &str,
    parse: impl FnOnce(&str) -> Result<String, bandscore::ComputeError>,
) -> DoctorCheck {
    let (status, message) = if !path.exists() {
        (CheckStatus::Warning, format!("{} file does not exist", name))
    } else {
        match fs::read_to_string(path) {
            Ok(content) => match parse(&content) {
                Ok(message) => (CheckStatus::Ok, message),
                Err(e) => (CheckStatus::Error, format!("Invalid {} file: {}", name, e)),
            },
            Err(e) => (CheckStatus::Error, format!("Cannot read {} file: {}", name, e)),
        }
    };

    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

// Helper functions

fn format_output(
    snapshots: &[EngineSnapshot],
    format: &OutputFormat,
) -> Result<String, BandCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for snapshot in snapshots {
                lines.push(serde_json::to_string(snapshot)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(snapshots)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(snapshots)?),
    }
}

// Error types

#[derive(Debug)]
enum BandCliError {
    Io(io::Error),
    Compute(bandscore::ComputeError),
    Json(serde_json::Error),
    NoMessages,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for BandCliError {
    fn from(e: io::Error) -> Self {
        BandCliError::Io(e)
    }
}

impl From<bandscore::ComputeError> for BandCliError {
    fn from(e: bandscore::ComputeError) -> Self {
        BandCliError::Compute(e)
    }
}

impl From<serde_json::Error> for BandCliError {
    fn from(e: serde_json::Error) -> Self {
        BandCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BandCliError> for CliError {
    fn from(e: BandCliError) -> Self {
        match e {
            BandCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            BandCliError::Compute(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'bandscore validate' on the input for details".to_string()),
            },
            BandCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            BandCliError::NoMessages => CliError {
                code: "NO_MESSAGES".to_string(),
                message: "No messages found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            BandCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} messages failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            BandCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            BandCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_messages: usize,
    valid_messages: usize,
    invalid_messages: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    address: String,
    error: String,
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
