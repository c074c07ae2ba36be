use futures_util::future::try_join_all;
use procbridge_rpc::{create_client_with_config, BridgeConfig, BridgeError, Fault, Result};
use procbridge_transport::ConnectionDescriptor;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd::{build_runtime, install_ctrlc_handler, parse_duration, ChildArgs};
use crate::demo::ExampleProxy;
use crate::exit::{bridge_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::print_line;

const RANDOM_DELAY_CALLS: usize = 5;

pub fn run(args: ChildArgs) -> CliResult<i32> {
    let descriptor: ConnectionDescriptor = args
        .descriptor
        .parse()
        .map_err(|err| transport_error("invalid descriptor", err))?;
    let call_timeout = parse_duration(&args.timeout)?;

    let runtime = build_runtime()?;
    let _entered = runtime.enter();

    let interrupt = CancellationToken::new();
    install_ctrlc_handler(interrupt.clone())?;

    let config = BridgeConfig {
        call_timeout: Some(call_timeout),
        parent: Some(interrupt),
        ..BridgeConfig::default()
    };
    let client = create_client_with_config::<ExampleProxy>(&descriptor, config)
        .map_err(|err| bridge_error("failed to create client", err))?;
    runtime
        .block_on(client.wait_for_connection(None, true))
        .map_err(|err| bridge_error("failed to connect", err))?;
    debug!(%descriptor, "connected to parent");

    let outcome = exercise(&runtime, client.dispatch());
    runtime.block_on(client.dispose());
    outcome.map(|()| SUCCESS)
}

/// Call every Example method once, printing one line per observable result.
///
/// Synchronous methods are called from this thread directly; deferred ones
/// are driven to completion on `runtime`.
fn exercise(runtime: &Runtime, proxy: &ExampleProxy) -> CliResult<()> {
    let guid = proxy
        .append_guid("AAA", "BBB")
        .map_err(|err| bridge_error("append_guid failed", err))?;
    print_line(&guid);

    let fault = expect_fault("throw_exception", proxy.throw_exception())?;
    print_line(fault.kind());
    print_line(fault.message());

    let text = runtime
        .block_on(proxy.async_test())
        .map_err(|err| bridge_error("async_test failed", err))?;
    print_line(&text);

    let fault = expect_fault("async_throw", runtime.block_on(proxy.async_throw()))?;
    print_line(fault.kind());
    print_line(fault.message());

    let number = runtime
        .block_on(proxy.value_task(420))
        .map_err(|err| bridge_error("value_task failed", err))?;
    print_line(&number);

    runtime
        .block_on(proxy.empty_value_task())
        .map_err(|err| bridge_error("empty_value_task failed", err))?;
    print_line("");

    let fault = expect_fault(
        "throwing_value_task",
        runtime.block_on(proxy.throwing_value_task()),
    )?;
    print_line(fault.message());

    runtime
        .block_on(try_join_all(
            (0..RANDOM_DELAY_CALLS).map(|_| proxy.random_delay()),
        ))
        .map_err(|err| bridge_error("random_delay failed", err))?;

    proxy
        .log_message("child finished")
        .map_err(|err| bridge_error("log_message failed", err))
}

fn expect_fault<T>(method: &str, result: Result<T>) -> CliResult<Fault> {
    match result {
        Err(BridgeError::Remote(fault)) => Ok(fault),
        Err(err) => Err(bridge_error(&format!("{method} failed"), err)),
        Ok(_) => Err(CliError::new(
            FAILURE,
            format!("{method} was expected to fail but returned"),
        )),
    }
}
