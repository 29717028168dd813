use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use gantrylink_control::LoopConfig;
use gantrylink_frame::ControlState;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod run;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a gantry frame and print its payload.
    Encode(EncodeArgs),
    /// Decode a hex payload into a gantry frame.
    Decode(DecodeArgs),
    /// Drive the gantry through a CAN-bus bridge.
    Run(RunArgs),
    /// Run both control loops against a simulated gantry.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Run(args) => run::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Command,
    Telemetry,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame kind to build.
    #[arg(long, value_enum, default_value = "command")]
    pub kind: KindArg,
    /// Control state (label such as AUTO_ACTIVE, or wire value 1-6).
    #[arg(long, default_value = "AUTO_ACTIVE")]
    pub state: ControlState,
    /// Feed in mm/s.
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    pub feed: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i32,
    /// Absolute positioning (clears the relative flag).
    #[arg(long)]
    pub absolute: bool,
    /// Clear the jog flag.
    #[arg(long)]
    pub no_jog: bool,
    /// Auxiliary actuator bitmask (0-63).
    #[arg(long, default_value_t = 0)]
    pub pto_bits: u8,
    /// Clamp out-of-range values instead of rejecting them.
    #[arg(long)]
    pub clamp: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Payload as hex (spaces, colons, and a 0x prefix are ignored).
    pub payload: String,
    /// Arbiter ID the payload arrived on (e.g. 0x192).
    #[arg(long, value_parser = parse_arbiter_id)]
    pub id: Option<u32>,
    /// Decode as this kind. Defaults to the kind implied by --id, else telemetry.
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Bridge host name or IP address.
    #[arg(long, env = "GANTRYLINK_ADDRESS", default_value = "localhost")]
    pub address: String,
    /// Bridge TCP port.
    #[arg(long, env = "GANTRYLINK_CANBUS_PORT", default_value_t = 6001)]
    pub canbus_port: u16,
    /// Command period (e.g. 20ms).
    #[arg(long, default_value = "20ms")]
    pub period: String,
    /// Wait after a transport failure (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub backoff: String,
    /// Upper bound on a single bridge connect attempt (e.g. 1s).
    #[arg(long, default_value = "1s")]
    pub connect_timeout: String,
    /// Initial feed in mm/s.
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    pub feed: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i32,
    /// Mirror measured feed, position, and jog into the outgoing commands.
    #[arg(long)]
    pub follow_telemetry: bool,
    /// Exit after printing N telemetry changes.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of commands the simulated gantry answers before the session ends.
    #[arg(long, default_value_t = 25)]
    pub ticks: u64,
    /// Command period (e.g. 20ms).
    #[arg(long, default_value = "20ms")]
    pub period: String,
    /// Wait after a transport failure (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub backoff: String,
    /// Feed in mm/s.
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    pub feed: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i32,
    /// Mirror measured feed, position, and jog into the outgoing commands.
    #[arg(long)]
    pub follow_telemetry: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn loop_config(period: &str, backoff: &str) -> CliResult<LoopConfig> {
    Ok(LoopConfig {
        period: parse_duration(period)?,
        backoff: parse_duration(backoff)?,
        ..LoopConfig::default()
    })
}

pub(crate) fn parse_arbiter_id(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid arbiter id: {input}"))
}

pub(crate) fn parse_hex_payload(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    hex::decode(&digits).map_err(|err| {
        CliError::new(DATA_INVALID, format!("invalid hex payload: {input}: {err}"))
    })
}

/// Wait for a loop task after cancellation. A panicked loop is an internal error.
pub(crate) async fn join_loop(task: tokio::task::JoinHandle<()>, name: &str) -> CliResult<()> {
    task.await
        .map_err(|err| CliError::new(INTERNAL, format!("{name} task failed: {err}")))
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}
