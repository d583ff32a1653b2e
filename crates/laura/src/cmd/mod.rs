use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use laura_frame::Channel;
use laura_link::RemoteCommand;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod frame;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reassemble camera notification fragments and decode them.
    Decode(DecodeArgs),
    /// Encode or decode long-range radio frames.
    #[command(subcommand)]
    Frame(FrameCommand),
    /// Run a controller, a camera and a remote in memory.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Frame(FrameCommand::Encode(args)) => frame::encode(args, format),
        Command::Frame(FrameCommand::Decode(args)) => frame::decode(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Channel the fragments were received on (command, settings, query).
    #[arg(long, short = 'c', value_parser = parse_channel)]
    pub channel: Channel,
    /// Fragments as hex strings, in arrival order.
    #[arg(required = true, value_name = "HEX")]
    pub fragments: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum FrameCommand {
    /// Build a frame from addresses and a payload.
    Encode(FrameEncodeArgs),
    /// Parse a received frame and classify its payload.
    Decode(FrameDecodeArgs),
}

#[derive(Args, Debug)]
pub struct FrameEncodeArgs {
    /// Sender node id.
    #[arg(long, env = "LAURA_LOCAL_ID")]
    pub sender: u16,
    /// Receiver node id.
    #[arg(long)]
    pub receiver: u16,
    /// Raw payload as hex.
    #[arg(long, value_name = "HEX", conflicts_with = "command")]
    pub payload: Option<String>,
    /// Remote command payload.
    #[arg(long, value_enum, conflicts_with = "payload")]
    pub command: Option<CommandArg>,
}

#[derive(Args, Debug)]
pub struct FrameDecodeArgs {
    /// Received packet as hex.
    #[arg(value_name = "HEX")]
    pub frame: String,
    /// Only accept frames addressed to this node.
    #[arg(long, env = "LAURA_LOCAL_ID")]
    pub local_id: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandArg {
    Start,
    Stop,
    Trigger,
}

impl From<CommandArg> for RemoteCommand {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Start => RemoteCommand::Start,
            CommandArg::Stop => RemoteCommand::Stop,
            CommandArg::Trigger => RemoteCommand::Trigger,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// How long to run (e.g. 30s, 1500ms).
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub duration: Duration,
    /// Controller node id.
    #[arg(long, default_value_t = 1, env = "LAURA_CONTROLLER_ID")]
    pub controller_id: u16,
    /// Remote node id.
    #[arg(long, default_value_t = 0, env = "LAURA_REMOTE_ID")]
    pub remote_id: u16,
    /// Interval between remote trigger presses.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub trigger_every: Duration,
    /// Interval between controller heartbeats.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub heartbeat_interval: Duration,
    /// Remote-side heartbeat timeout.
    #[arg(long, default_value = "16s", value_parser = parse_duration)]
    pub liveness_timeout: Duration,
    /// Interval between camera status queries.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub query_interval: Duration,
    /// Pause after each camera setup request.
    #[arg(long, default_value = "500ms", value_parser = parse_duration)]
    pub command_spacing: Duration,
    /// First recovery backoff; doubles on each failed attempt.
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub initial_backoff: Duration,
    /// Put the camera to sleep after this long without remote activity.
    #[arg(long, value_parser = parse_duration)]
    pub inactivity_timeout: Option<Duration>,
    /// Recovery attempts before the controller gives up.
    #[arg(long, default_value_t = 5)]
    pub retry_budget: u32,
    /// Controller restarts allowed after exhausted recovery.
    #[arg(long, default_value_t = 3)]
    pub max_restarts: u32,
    /// Scans that find nothing before the camera appears.
    #[arg(long, default_value_t = 0)]
    pub fail_scans: usize,
    /// Camera writes that fail.
    #[arg(long, default_value_t = 0)]
    pub fail_writes: usize,
    /// Drop the camera connection once after this long.
    #[arg(long, value_parser = parse_duration)]
    pub drop_after: Option<Duration>,
    /// No camera in range at all.
    #[arg(long)]
    pub no_camera: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_channel(input: &str) -> Result<Channel, String> {
    input.parse::<Channel>().map_err(|err| err.to_string())
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    duration_from_str(input).map_err(|err| err.message)
}

fn duration_from_str(input: &str) -> CliResult<Duration> {
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
