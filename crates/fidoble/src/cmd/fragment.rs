use bytes::BytesMut;
use fidoble_frame::{ContinuationFragment, Frame, InitializationFragment};
use serde::Serialize;

use crate::cmd::FragmentArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Serialize, Debug)]
struct FragmentOutput {
    index: usize,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u8>,
    size: usize,
    hex: String,
}

#[derive(Serialize, Debug)]
struct FragmentReport {
    command: &'static str,
    payload_size: usize,
    control_point_length: u16,
    fragments: Vec<FragmentOutput>,
}

pub fn run(args: FragmentArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = Frame::new(args.command.into(), args.payload.resolve()?);
    let report = fragment(&frame, args.control_point_length)?;
    print_report(&report, format);
    Ok(SUCCESS)
}

fn fragment(frame: &Frame, control_point_length: u16) -> CliResult<FragmentReport> {
    let (init, conts) = frame
        .to_fragments(usize::from(control_point_length))
        .map_err(|err| frame_error("cannot fragment frame", err))?;

    let mut buf = BytesMut::new();
    let mut fragments = Vec::with_capacity(conts.len() + 1);
    fragments.push(init_output(&init, &mut buf));
    for (i, cont) in conts.iter().enumerate() {
        fragments.push(cont_output(i + 1, cont, &mut buf));
    }

    Ok(FragmentReport {
        command: frame.command().name(),
        payload_size: frame.data().len(),
        control_point_length,
        fragments,
    })
}

fn init_output(fragment: &InitializationFragment, buf: &mut BytesMut) -> FragmentOutput {
    fragment.serialize(buf);
    let wire = buf.split();
    FragmentOutput {
        index: 0,
        kind: "init",
        sequence: None,
        size: wire.len(),
        hex: hex::encode(&wire),
    }
}

fn cont_output(index: usize, fragment: &ContinuationFragment, buf: &mut BytesMut) -> FragmentOutput {
    fragment.serialize(buf);
    let wire = buf.split();
    FragmentOutput {
        index,
        kind: "cont",
        sequence: Some(fragment.sequence()),
        size: wire.len(),
        hex: hex::encode(&wire),
    }
}

fn print_report(report: &FragmentReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "KIND", "SEQ", "SIZE", "BYTES"]);
            for fragment in &report.fragments {
                table.add_row(vec![
                    fragment.index.to_string(),
                    fragment.kind.to_string(),
                    fragment
                        .sequence
                        .map_or_else(|| "-".to_string(), |seq| seq.to_string()),
                    fragment.size.to_string(),
                    fragment.hex.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} payload={} bytes control_point_length={} fragments={}",
                report.command,
                report.payload_size,
                report.control_point_length,
                report.fragments.len()
            );
            for fragment in &report.fragments {
                println!("  [{}] {:<4} {}", fragment.index, fragment.kind, fragment.hex);
            }
        }
        OutputFormat::Raw => {
            for fragment in &report.fragments {
                println!("{}", fragment.hex);
            }
        }
    }
}
