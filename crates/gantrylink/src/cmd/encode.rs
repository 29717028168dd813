use gantrylink_frame::{CommandFrame, TelemetryFrame};

use crate::cmd::{EncodeArgs, KindArg};
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_frame, FrameView, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let view = build_view(&args)?;
    print_frame(&view, format);
    Ok(SUCCESS)
}

fn build_view(args: &EncodeArgs) -> CliResult<FrameView> {
    let command = if args.clamp {
        CommandFrame::saturating(
            args.state,
            args.feed,
            args.x,
            args.y,
            !args.absolute,
            !args.no_jog,
            args.pto_bits,
        )
    } else {
        CommandFrame::checked(
            args.state,
            args.feed,
            args.x,
            args.y,
            !args.absolute,
            !args.no_jog,
            args.pto_bits,
        )
        .map_err(|err| encode_error("encode failed", err))?
    };

    match args.kind {
        KindArg::Command => {
            let raw = command
                .to_raw()
                .map_err(|err| encode_error("encode failed", err))?;
            Ok(FrameView::command(&command, &raw))
        }
        KindArg::Telemetry => {
            let telemetry = TelemetryFrame::new(
                command.state_request,
                command.feed,
                command.x,
                command.y,
                command.relative,
                command.jog,
            )
            .with_pto_bits(command.pto_bits);
            let raw = telemetry
                .to_raw()
                .map_err(|err| encode_error("encode failed", err))?;
            Ok(FrameView::telemetry(&telemetry, &raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use gantrylink_frame::ControlState;

    use super::*;
    use crate::exit::DATA_INVALID;

    fn args() -> EncodeArgs {
        EncodeArgs {
            kind: KindArg::Command,
            state: ControlState::AutoActive,
            feed: 1000,
            x: 50,
            y: -50,
            absolute: false,
            no_jog: false,
            pto_bits: 0,
            clamp: false,
        }
    }

    #[test]
    fn encodes_reference_command() {
        let view = build_view(&args()).expect("reference command should encode");
        assert_eq!(view.payload, "04e8033200ceff03");
        assert_eq!(view.arbiter_id, 0x212);
    }

    #[test]
    fn rejects_out_of_range_without_clamp() {
        let err = build_view(&EncodeArgs {
            feed: 40_000,
            ..args()
        })
        .expect_err("feed should not fit");
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn clamps_when_asked() {
        let view = build_view(&EncodeArgs {
            feed: 40_000,
            pto_bits: 0xFF,
            clamp: true,
            ..args()
        })
        .expect("clamped command should encode");
        assert_eq!(view.feed, i16::MAX);
        assert_eq!(view.pto_bits, 0x3F);
    }

    #[test]
    fn telemetry_kind_uses_telemetry_id() {
        let view = build_view(&EncodeArgs {
            kind: KindArg::Telemetry,
            absolute: true,
            no_jog: true,
            ..args()
        })
        .expect("telemetry should encode");
        assert_eq!(view.arbiter_id, 0x192);
        assert_eq!(view.payload, "04e8033200ceff00");
    }
}
