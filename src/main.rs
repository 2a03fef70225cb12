//! V4L2-Snapshot command-line front end.
//!
//! Prints JSON on stdout and logs on stderr.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use v4l2_snapshot::{
    Capability, DeviceEntry, DeviceTable, FourCC, FrameSize, KernelOpener, ResolutionRequest,
    Snapshot, SnapshotConfig, SnapshotService,
};

/// Raw output file used when `--output` is not given.
const DEFAULT_OUTPUT: &str = "snapshot.jpg";

/// Capture still frames from V4L2 cameras
#[derive(Parser, Debug)]
#[command(name = "v4l2-snapshot")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use `RUST_LOG=trace` for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configured camera as NAME=PATH (repeatable)
    #[arg(short, long = "device", value_name = "NAME=PATH", global = true)]
    devices: Vec<DeviceEntry>,

    /// Pixel format to enumerate and capture
    #[arg(long, value_name = "FOURCC", default_value = "MJPG", global = true)]
    pixel_format: FourCC,

    /// Frame wait bound in milliseconds, 0 waits forever
    #[arg(long, value_name = "MS", default_value_t = 5000, global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show capability information for every configured camera
    List,

    /// Show capability and supported resolutions of one camera
    Info {
        /// Camera name from --device
        name: String,
    },

    /// Capture one frame as raw bytes or base64 JSON
    Snapshot {
        /// Camera name from --device
        name: String,

        /// Preferred width; the nearest advertised width wins
        #[arg(long)]
        width: Option<u32>,

        /// Preferred height, used when no width is given
        #[arg(long)]
        height: Option<u32>,

        /// How the frame is delivered
        #[arg(long, value_enum, default_value_t = OutputFormat::Raw)]
        format: OutputFormat,

        /// Output file [default: snapshot.jpg for raw, stdout for json]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Delivery of a captured frame
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Encoded bytes written to the output file, summary on stdout
    Raw,
    /// Width, height and base64 frame data as one JSON object
    Json,
}

impl Cli {
    fn config(&self) -> SnapshotConfig {
        let timeout = (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms));
        SnapshotConfig::default()
            .with_pixel_format(self.pixel_format)
            .with_dequeue_timeout(timeout)
    }
}

/// CLI error with exit code mapping
#[derive(Debug)]
enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Name not present in the device table
    UnknownDevice(String),
    /// Device cannot be opened or does not support snapshots
    DeviceUnavailable(String),
    /// Failure inside the capture cycle
    CaptureFailed(String),
    /// Anything else
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgs(msg) => write!(f, "Invalid arguments: {msg}"),
            Self::UnknownDevice(name) => write!(f, "Unknown device: {name}"),
            Self::DeviceUnavailable(msg) => write!(f, "Device unavailable: {msg}"),
            Self::CaptureFailed(msg) => write!(f, "Capture failed: {msg}"),
            Self::General(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    const fn code(&self) -> u8 {
        match self {
            Self::InvalidArgs(_) | Self::UnknownDevice(_) => 2,
            Self::DeviceUnavailable(_) => 3,
            Self::CaptureFailed(_) => 4,
            Self::General(_) => 1,
        }
    }
}

impl From<v4l2_snapshot::Error> for CliError {
    fn from(err: v4l2_snapshot::Error) -> Self {
        use v4l2_snapshot::Error;

        let msg = format!("[{}] {err}", err.stage());
        match err {
            Error::DeviceOpen { .. }
            | Error::CapabilityQuery { .. }
            | Error::UnsupportedDevice { .. }
            | Error::FormatEnumeration { .. }
            | Error::FormatNotAdvertised { .. }
            | Error::NoCandidates { .. } => Self::DeviceUnavailable(msg),
            Error::FormatSet { .. }
            | Error::BufferRequest { .. }
            | Error::BufferMap { .. }
            | Error::StreamOn { .. }
            | Error::BufferQueue { .. }
            | Error::BufferDequeue { .. } => Self::CaptureFailed(msg),
            Error::Ioctl { .. } => Self::General(msg),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}

/// Initialize `env_logger` based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.devices.is_empty() {
        return Err(CliError::InvalidArgs(
            "at least one --device NAME=PATH is required".to_owned(),
        ));
    }
    let table: DeviceTable = cli.devices.iter().cloned().collect();
    let service = SnapshotService::new(KernelOpener, cli.config());

    match &cli.command {
        Commands::List => list(&service, &table),
        Commands::Info { name } => info(&service, lookup(&table, name)?),
        Commands::Snapshot {
            name,
            width,
            height,
            format,
            output,
        } => {
            let request = ResolutionRequest {
                width: *width,
                height: *height,
            };
            let entry = lookup(&table, name)?;
            snapshot(&service, entry, &request, *format, output.as_deref())
        }
    }
}

fn lookup<'t>(table: &'t DeviceTable, name: &str) -> Result<&'t DeviceEntry, CliError> {
    table
        .find(name)
        .ok_or_else(|| CliError::UnknownDevice(name.to_owned()))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::General(format!("cannot encode output: {err}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|err| CliError::General(format!("cannot write {}: {err}", path.display())))
}

#[derive(Debug, Serialize)]
struct DeviceRow<'a> {
    name: &'a str,
    file: &'a str,
    #[serde(flatten)]
    info: Option<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> DeviceRow<'a> {
    fn query(service: &SnapshotService<KernelOpener>, entry: &'a DeviceEntry) -> Self {
        let (info, error) = match service.capability(&entry.path) {
            Ok(capability) => (Some(capability), None),
            Err(err) => {
                log::warn!("{}: {err}", entry.name);
                (None, Some(err.to_string()))
            }
        };
        Self {
            name: &entry.name,
            file: &entry.path,
            info,
            error,
        }
    }
}

fn list(service: &SnapshotService<KernelOpener>, table: &DeviceTable) -> Result<(), CliError> {
    let rows: Vec<DeviceRow<'_>> = thread::scope(|scope| {
        // All devices are queried concurrently; rows keep table order.
        let mut handles = Vec::with_capacity(table.len());
        for entry in table.entries() {
            handles.push((entry, scope.spawn(move || DeviceRow::query(service, entry))));
        }
        handles
            .into_iter()
            .map(|(entry, handle)| {
                handle.join().unwrap_or_else(|_| DeviceRow {
                    name: &entry.name,
                    file: &entry.path,
                    info: None,
                    error: Some("query thread panicked".to_owned()),
                })
            })
            .collect()
    });
    print_json(&rows)
}

#[derive(Debug, Serialize)]
struct InfoOutput<'a> {
    info: &'a Capability,
    resolutions: &'a [FrameSize],
}

fn info(service: &SnapshotService<KernelOpener>, entry: &DeviceEntry) -> Result<(), CliError> {
    let description = service.describe(&entry.path)?;
    print_json(&InfoOutput {
        info: &description.capability,
        resolutions: &description.resolutions,
    })
}

#[derive(Debug, Serialize)]
struct SnapshotSummary<'a> {
    width: u32,
    height: u32,
    bytes: usize,
    output: &'a Path,
}

#[derive(Debug, Serialize)]
struct SnapshotPayload {
    width: u32,
    height: u32,
    data: String,
}

impl From<&Snapshot> for SnapshotPayload {
    fn from(frame: &Snapshot) -> Self {
        Self {
            width: frame.size.width,
            height: frame.size.height,
            data: BASE64_STANDARD.encode(&frame.data),
        }
    }
}

fn snapshot(
    service: &SnapshotService<KernelOpener>,
    entry: &DeviceEntry,
    request: &ResolutionRequest,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let frame = service.capture(&entry.path, request)?;
    if let Some(summary) = deliver(&frame, format, output)? {
        log::info!(
            "{}: wrote {} bytes to {}",
            entry.name,
            frame.len(),
            summary.output.display()
        );
        print_json(&summary)?;
    }
    Ok(())
}

/// Write `frame` as `format`. Returns the summary when a file was written.
fn deliver<'a>(
    frame: &Snapshot,
    format: OutputFormat,
    output: Option<&'a Path>,
) -> Result<Option<SnapshotSummary<'a>>, CliError> {
    let json;
    let (path, contents): (&Path, &[u8]) = match (format, output) {
        (OutputFormat::Json, None) => {
            print_json(&SnapshotPayload::from(frame))?;
            return Ok(None);
        }
        (OutputFormat::Json, Some(path)) => {
            json = to_json(&SnapshotPayload::from(frame))?;
            (path, json.as_bytes())
        }
        (OutputFormat::Raw, path) => (
            path.unwrap_or_else(|| Path::new(DEFAULT_OUTPUT)),
            frame.data.as_slice(),
        ),
    };
    write_file(path, contents)?;
    Ok(Some(SnapshotSummary {
        width: frame.size.width,
        height: frame.size.height,
        bytes: frame.len(),
        output: path,
    }))
}
