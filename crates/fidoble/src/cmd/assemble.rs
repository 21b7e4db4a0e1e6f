use fidoble_frame::{ContinuationFragment, Frame, FrameAssembler, InitializationFragment};

use crate::cmd::{decode_hex, hex_error, AssembleArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: AssembleArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = assemble(&args.fragments)?;
    print_frame(&frame, format);
    Ok(SUCCESS)
}

fn assemble(fragments: &[String]) -> CliResult<Frame> {
    let (first, rest) = fragments
        .split_first()
        .ok_or_else(|| CliError::new(USAGE, "at least one fragment is required"))?;

    let data = decode_hex(first).map_err(|err| hex_error("fragment 0", err))?;
    let init =
        InitializationFragment::parse(&data).map_err(|err| frame_error("fragment 0", err))?;
    let mut assembler = FrameAssembler::new(&init);

    for (i, fragment) in rest.iter().enumerate() {
        let context = format!("fragment {}", i + 1);
        let data = decode_hex(fragment).map_err(|err| hex_error(&context, err))?;
        ContinuationFragment::parse(&data)
            .and_then(|cont| assembler.add_fragment(&cont))
            .map_err(|err| frame_error(&context, err))?;
    }

    assembler.into_frame().ok_or_else(|| {
        CliError::new(
            DATA_INVALID,
            "incomplete frame: more continuation fragments expected",
        )
    })
}

#[cfg(test)]
mod tests {
    use fidoble_frame::FrameCommand;

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reassembles_fragments() {
        let frame = assemble(&strings(&["830005aabb", "00ccdd", "01ee"])).unwrap();
        assert_eq!(frame.command(), FrameCommand::Msg);
        assert_eq!(frame.data().as_ref(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn incomplete_frame_rejected() {
        let err = assemble(&strings(&["830005aabb"])).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn out_of_sequence_rejected() {
        let err = assemble(&strings(&["830004aabb", "01ccdd"])).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("fragment 1"));
    }

    #[test]
    fn invalid_hex_rejected() {
        let err = assemble(&strings(&["zz"])).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn unknown_command_rejected() {
        let err = assemble(&strings(&["010000"])).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
