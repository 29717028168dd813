use gantrylink_frame::{FrameKind, DEVICE_OFFSET};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("gantrylink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: gantrylink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("GANTRYLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("device_offset: {DEVICE_OFFSET:#04x}");
    println!("command_id: {:#05x}", FrameKind::Command.arbiter_id());
    println!("telemetry_id: {:#05x}", FrameKind::Telemetry.arbiter_id());

    Ok(SUCCESS)
}
