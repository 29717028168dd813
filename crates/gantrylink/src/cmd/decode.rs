use gantrylink_frame::{CommandFrame, FrameKind, RawCanFrame, TelemetryFrame};

use crate::cmd::{parse_hex_payload, DecodeArgs, KindArg};
use crate::exit::{decode_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, FrameView, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex_payload(&args.payload)?;
    let view = decode_view(payload, args.id, args.kind)?;
    print_frame(&view, format);
    Ok(SUCCESS)
}

fn decode_view(payload: Vec<u8>, id: Option<u32>, kind: Option<KindArg>) -> CliResult<FrameView> {
    let kind = match (kind, id) {
        (Some(kind), _) => kind,
        (None, None) => KindArg::Telemetry,
        (None, Some(id)) if id == FrameKind::Command.arbiter_id() => KindArg::Command,
        (None, Some(id)) if id == FrameKind::Telemetry.arbiter_id() => KindArg::Telemetry,
        (None, Some(id)) => {
            return Err(CliError::new(
                DATA_INVALID,
                format!("arbiter id {id:#x} is not a gantry frame"),
            ))
        }
    };

    match kind {
        KindArg::Command => {
            let raw = RawCanFrame::new(id.unwrap_or(FrameKind::Command.arbiter_id()), payload);
            let frame =
                CommandFrame::from_raw(&raw).map_err(|err| decode_error("decode failed", err))?;
            Ok(FrameView::command(&frame, &raw))
        }
        KindArg::Telemetry => {
            let raw = RawCanFrame::new(id.unwrap_or(FrameKind::Telemetry.arbiter_id()), payload);
            let frame =
                TelemetryFrame::from_raw(&raw).map_err(|err| decode_error("decode failed", err))?;
            Ok(FrameView::telemetry(&frame, &raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::FAILURE;

    const REFERENCE: [u8; 8] = [0x04, 0xE8, 0x03, 0x32, 0x00, 0xCE, 0xFF, 0x03];

    #[test]
    fn defaults_to_telemetry() {
        let view = decode_view(REFERENCE.to_vec(), None, None).expect("payload should decode");
        assert_eq!(view.kind, "TELEMETRY");
        assert_eq!(view.state, "AUTO_ACTIVE");
        assert_eq!((view.feed, view.x, view.y), (1000, 50, -50));
    }

    #[test]
    fn command_id_selects_command_kind() {
        let view =
            decode_view(REFERENCE.to_vec(), Some(0x212), None).expect("payload should decode");
        assert_eq!(view.kind, "COMMAND");
    }

    #[test]
    fn foreign_id_is_rejected() {
        let err = decode_view(REFERENCE.to_vec(), Some(0x18E), None)
            .expect_err("foreign node should be rejected");
        assert_eq!(err.code, DATA_INVALID);

        let err = decode_view(REFERENCE.to_vec(), Some(0x18E), Some(KindArg::Telemetry))
            .expect_err("explicit kind still checks the id");
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn unknown_state_and_short_payload_are_data_invalid() {
        let mut bad_state = REFERENCE;
        bad_state[0] = 0x09;
        assert_eq!(
            decode_view(bad_state.to_vec(), None, None)
                .expect_err("state 9 is unknown")
                .code,
            DATA_INVALID
        );
        assert_eq!(
            decode_view(REFERENCE[..7].to_vec(), None, None)
                .expect_err("seven bytes is short")
                .code,
            DATA_INVALID
        );
    }
}
