use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use fidoble_frame::Frame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// JSON view of a frame.
#[derive(Serialize, Debug)]
pub struct FrameOutput {
    pub command: &'static str,
    pub command_byte: u8,
    pub length: usize,
    pub valid: bool,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl FrameOutput {
    pub fn new(frame: &Frame) -> Self {
        Self {
            command: frame.command().name(),
            command_byte: frame.command().into(),
            length: frame.data().len(),
            valid: frame.is_valid(),
            payload: hex::encode(frame.data()),
            keepalive_code: frame.keepalive_code().map(|code| code.to_string()),
            error_code: frame.error_code().map(|code| code.to_string()),
        }
    }

    /// Keep-alive or error status, when the frame carries one.
    pub fn status(&self) -> Option<&str> {
        self.keepalive_code
            .as_deref()
            .or(self.error_code.as_deref())
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let out = FrameOutput::new(frame);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "LENGTH", "VALID", "STATUS", "PAYLOAD"]);
            table.add_row(vec![
                frame.command().to_string(),
                out.length.to_string(),
                out.valid.to_string(),
                out.status().unwrap_or("-").to_string(),
                out.payload.clone(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} length={} valid={} payload={}",
                frame.command(),
                out.length,
                out.valid,
                out.payload
            );
            if let Some(status) = out.status() {
                println!("status={status}");
            }
        }
        OutputFormat::Raw => print_raw(frame.data()),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[cfg(test)]
mod tests {
    use fidoble_frame::FrameCommand;

    use super::*;

    #[test]
    fn frame_output_decodes_status() {
        let out = FrameOutput::new(&Frame::new(FrameCommand::Error, vec![0x06]));
        assert_eq!(out.command, "ERROR");
        assert_eq!(out.command_byte, 0xBF);
        assert_eq!(out.payload, "06");
        assert_eq!(out.status(), Some("BUSY (0x06)"));
    }

    #[test]
    fn frame_output_json_omits_missing_codes() {
        let out = FrameOutput::new(&Frame::new(FrameCommand::Msg, vec![0xAB, 0xCD]));
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"payload\":\"abcd\""));
        assert!(!json.contains("error_code"));
        assert!(!json.contains("keepalive_code"));
    }
}
