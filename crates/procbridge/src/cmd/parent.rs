use std::process::Stdio;
use std::sync::Arc;

use procbridge_rpc::{create_server_with_config, BridgeConfig};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{build_runtime, install_ctrlc_handler, parse_duration, ParentArgs};
use crate::demo::ExampleService;
use crate::exit::{bridge_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_report, OutputFormat, RunReport};

pub fn run(args: ParentArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let timeout = parse_duration(&args.timeout)?;
    let child_exe = match args.child_exe {
        Some(path) => path,
        None => std::env::current_exe()
            .map_err(|err| io_error("cannot locate the child executable", err))?,
    };

    let runtime = build_runtime()?;
    let _entered = runtime.enter();

    let interrupt = CancellationToken::new();
    install_ctrlc_handler(interrupt.clone())?;

    let service = Arc::new(ExampleService::default());
    let config = BridgeConfig {
        connect_timeout,
        parent: Some(interrupt.clone()),
        ..BridgeConfig::default()
    };
    let (server, descriptor) = create_server_with_config(Arc::clone(&service), config)
        .map_err(|err| bridge_error("failed to create server", err))?;

    let child = Command::new(&child_exe)
        .arg("--log-level")
        .arg(args.child_log_level.as_arg())
        .arg("child")
        .arg(descriptor.to_string())
        .arg("--timeout")
        .arg(&args.timeout)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| io_error("failed to launch child", err))?;
    info!(pid = child.id(), exe = %child_exe.display(), "child launched");

    let finished = runtime.block_on(async {
        server
            .wait_for_connection(None, true)
            .await
            .map_err(|err| bridge_error("child did not connect", err))?;

        tokio::select! {
            _ = interrupt.cancelled() => Err(CliError::new(FAILURE, "interrupted")),
            output = tokio::time::timeout(timeout, child.wait_with_output()) => match output {
                Ok(output) => output.map_err(|err| io_error("failed to wait for child", err)),
                Err(_) => Err(CliError::new(
                    TIMEOUT,
                    format!("child did not finish within {timeout:?}"),
                )),
            },
        }
    });
    let output = match finished {
        Ok(output) => output,
        Err(err) => {
            runtime.block_on(server.dispose());
            return Err(err);
        }
    };

    // Frames the child wrote before exiting are served before the link closes.
    if runtime
        .block_on(tokio::time::timeout(connect_timeout, server.closed()))
        .is_err()
    {
        warn!("child exited but the link is still open");
    }

    let report = RunReport {
        descriptor: descriptor.to_string(),
        child_exit_code: output.status.code(),
        results: String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        notifications: service.notifications(),
        stats: server.stats(),
    };
    runtime.block_on(server.dispose());
    print_report(&report, format);

    if output.status.success() {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            FAILURE,
            format!("child exited with {}", output.status),
        ))
    }
}
