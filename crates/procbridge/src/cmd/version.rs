use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("procbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: procbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PROCBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "max_line_length: {}",
        procbridge_frame::DEFAULT_MAX_LINE_LENGTH
    );
    println!(
        "connect_timeout_ms: {}",
        procbridge_rpc::DEFAULT_CONNECT_TIMEOUT.as_millis()
    );
    println!("socket_pairs: {}", cfg!(unix));

    Ok(SUCCESS)
}
