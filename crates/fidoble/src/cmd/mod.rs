use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use fidoble_frame::FrameCommand;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod assemble;
pub mod fragment;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a payload into control point fragments.
    Fragment(FragmentArgs),
    /// Reassemble hex fragments into a frame.
    Assemble(AssembleArgs),
    /// Run one transaction against a virtual authenticator.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Fragment(args) => fragment::run(args, format),
        Command::Assemble(args) => assemble::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Frame command selectable on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandArg {
    Ping,
    #[value(name = "keepalive")]
    KeepAlive,
    Msg,
    Cancel,
    Error,
}

impl From<CommandArg> for FrameCommand {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Ping => FrameCommand::Ping,
            CommandArg::KeepAlive => FrameCommand::KeepAlive,
            CommandArg::Msg => FrameCommand::Msg,
            CommandArg::Cancel => FrameCommand::Cancel,
            CommandArg::Error => FrameCommand::Error,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["hex", "data"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(text) = &self.hex {
            return decode_hex(text).map_err(|err| CliError::new(USAGE, format!("--hex: {err}")));
        }
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct FragmentArgs {
    /// Frame command.
    #[arg(long, short = 'c', value_enum, default_value = "msg")]
    pub command: CommandArg,
    /// Control point length in bytes.
    #[arg(long, default_value_t = 20)]
    pub control_point_length: u16,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Hex-encoded fragments in wire order, initialization fragment first.
    #[arg(required = true, num_args = 1..)]
    pub fragments: Vec<String>,
}

/// Virtual authenticator behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BehaviorArg {
    /// Echo the request back.
    Echo,
    /// Send keep-alives, then echo.
    Keepalive,
    /// Answer with an error frame.
    Error,
    /// Never answer.
    Silent,
    /// Fail control point writes.
    FailWrite,
    /// Answer with a truncated fragment.
    Malformed,
}

impl BehaviorArg {
    pub fn name(self) -> &'static str {
        match self {
            BehaviorArg::Echo => "echo",
            BehaviorArg::Keepalive => "keepalive",
            BehaviorArg::Error => "error",
            BehaviorArg::Silent => "silent",
            BehaviorArg::FailWrite => "fail-write",
            BehaviorArg::Malformed => "malformed",
        }
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// How the virtual authenticator answers.
    #[arg(long, short = 'b', value_enum, default_value = "echo")]
    pub behavior: BehaviorArg,
    /// Request frame command.
    #[arg(long, short = 'c', value_enum, default_value = "msg")]
    pub command: CommandArg,
    /// Control point length in bytes.
    #[arg(long, default_value_t = 20)]
    pub control_point_length: u16,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Device timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
    /// Keep-alives sent before the answer (keepalive behavior).
    #[arg(long, default_value_t = 2)]
    pub keepalives: usize,
    /// Delay before each keep-alive (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub keepalive_interval: String,
    /// Status byte for the error behavior (e.g. 0x06).
    #[arg(long, default_value = "0x06", value_parser = parse_status_byte)]
    pub error_code: u8,
    /// Cancel the request after this long (e.g. 500ms).
    #[arg(long)]
    pub cancel_after: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
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

/// Decode hex, ignoring whitespace and `:` separators.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    hex::decode(digits)
}

pub fn hex_error(context: &str, err: hex::FromHexError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

fn parse_status_byte(input: &str) -> Result<u8, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid status byte {input:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn decode_hex_accepts_separators() {
        assert_eq!(decode_hex("83:00:02 ab cd").unwrap(), vec![0x83, 0x00, 0x02, 0xAB, 0xCD]);
        assert_eq!(decode_hex("0x8100").unwrap(), vec![0x81, 0x00]);
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn status_byte_parses_hex_and_decimal() {
        assert_eq!(parse_status_byte("0x7F").unwrap(), 0x7F);
        assert_eq!(parse_status_byte("6").unwrap(), 6);
        assert!(parse_status_byte("0x100").is_err());
    }

    #[test]
    fn payload_prefers_hex() {
        let payload = PayloadArgs {
            hex: Some("0102".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(payload.resolve().unwrap(), vec![1, 2]);
        assert!(PayloadArgs::default().resolve().unwrap().is_empty());
    }

    #[test]
    fn command_arg_maps_to_frame_command() {
        assert_eq!(FrameCommand::from(CommandArg::KeepAlive), FrameCommand::KeepAlive);
        assert_eq!(FrameCommand::from(CommandArg::Msg), FrameCommand::Msg);
    }
}
