use std::sync::Arc;

use gantrylink_control::{
    CancellationToken, CommandInputs, CommandPublisher, CommandSlot, LoopConfig, TelemetryIngest,
    TelemetrySlot,
};
use gantrylink_frame::{CommandFrame, RawCanFrame, TelemetryFrame};
use gantrylink_transport::{CanbusTransport, MemoryBus, ServiceState};
use tokio::sync::broadcast;

use crate::cmd::{join_loop, loop_config, runtime, SimulateArgs};
use crate::exit::{control_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_summary, OutputFormat, SessionSummary};

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = loop_config(&args.period, &args.backoff)?;
    let summary = runtime()?.block_on(simulate(&args, config))?;
    print_summary(&summary, format);
    Ok(SUCCESS)
}

async fn simulate(args: &SimulateArgs, config: LoopConfig) -> CliResult<SessionSummary> {
    let bus = MemoryBus::new(ServiceState::Running);
    let transport: Arc<dyn CanbusTransport> = Arc::new(bus.clone());
    let telemetry = TelemetrySlot::default();
    let commands = CommandSlot::new(CommandInputs {
        feed: args.feed,
        x: args.x,
        y: args.y,
        ..CommandInputs::default()
    });

    let publisher = CommandPublisher::new(
        transport.clone(),
        commands.clone(),
        telemetry.clone(),
        config,
    )
    .map_err(|err| control_error("invalid timing", err))?;
    let mut ingest = TelemetryIngest::new(transport, telemetry.clone(), config)
        .map_err(|err| control_error("invalid timing", err))?;
    if args.follow_telemetry {
        ingest = ingest.mirror_into(commands);
    }

    let status = publisher.status();
    let counters = ingest.counters();
    let cancel = CancellationToken::new();
    let gantry = tokio::spawn(simulated_gantry(
        bus.clone(),
        bus.subscribe_sent(),
        args.ticks,
        cancel.clone(),
    ));
    let publisher_task = tokio::spawn(publisher.run(cancel.clone()));
    let ingest_task = tokio::spawn(ingest.run(cancel.clone()));

    let last = gantry
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("simulated gantry failed: {err}")))?;

    // Give ingest one backoff interval to pick up the final answer.
    if let Some(last) = last {
        let mut updates = telemetry.subscribe();
        let caught_up = updates.wait_for(|latest| latest.as_ref() == Some(&last));
        if tokio::time::timeout(config.backoff, caught_up).await.is_err() {
            tracing::debug!("ingest did not observe the final telemetry frame");
        }
    }

    cancel.cancel();
    join_loop(publisher_task, "command publisher").await?;
    join_loop(ingest_task, "telemetry ingest").await?;

    let publisher_status = *status.borrow();
    Ok(SessionSummary::new(
        publisher_status,
        counters.totals(),
        telemetry.load().as_ref(),
    ))
}

/// Answer every command with telemetry that reports the commanded values.
///
/// Returns the last telemetry frame put on the bus.
async fn simulated_gantry(
    bus: MemoryBus,
    mut sent: broadcast::Receiver<RawCanFrame>,
    ticks: u64,
    cancel: CancellationToken,
) -> Option<TelemetryFrame> {
    let mut answered = 0u64;
    let mut last = None;

    while answered < ticks {
        let raw = tokio::select! {
            received = sent.recv() => match received {
                Ok(raw) => raw,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "simulated gantry fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        };

        let command = match CommandFrame::from_raw(&raw) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "simulated gantry ignoring frame");
                continue;
            }
        };

        let reply = echo(&command);
        match reply.to_raw() {
            Ok(frame) => {
                bus.inject(frame);
                answered += 1;
                last = Some(reply);
            }
            Err(err) => tracing::warn!(error = %err, "simulated gantry cannot encode reply"),
        }
    }

    tracing::debug!(answered, "simulated gantry finished");
    last
}

fn echo(command: &CommandFrame) -> TelemetryFrame {
    TelemetryFrame::new(
        command.state_request,
        command.feed,
        command.x,
        command.y,
        command.relative,
        command.jog,
    )
    .with_pto_bits(command.pto_bits)
}
