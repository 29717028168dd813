use std::sync::Arc;

use gantrylink_control::{
    CancellationToken, CommandInputs, CommandPublisher, CommandSlot, LoopConfig, TelemetryIngest,
    TelemetrySlot,
};
use gantrylink_frame::TelemetryFrame;
use gantrylink_transport::{BridgeClient, BridgeConfig, CanbusTransport};

use crate::cmd::{join_loop, loop_config, parse_duration, runtime, RunArgs};
use crate::exit::{control_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, FrameView, OutputFormat, SessionSummary};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = loop_config(&args.period, &args.backoff)?;
    let bridge = BridgeConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ..BridgeConfig::new(args.address.clone(), args.canbus_port)
    };

    runtime()?.block_on(session(args, config, bridge, format))
}

async fn session(
    args: RunArgs,
    config: LoopConfig,
    bridge: BridgeConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let client = BridgeClient::new(bridge);
    let endpoint = client.config().endpoint();
    let transport: Arc<dyn CanbusTransport> = Arc::new(client);
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
        ingest = ingest.mirror_into(commands.clone());
    }

    let status = publisher.status();
    let counters = ingest.counters();
    let cancel = CancellationToken::new();
    let publisher_task = tokio::spawn(publisher.run(cancel.clone()));
    let ingest_task = tokio::spawn(ingest.run(cancel.clone()));
    tracing::info!(%endpoint, period = ?config.period, "control session started");

    let mut updates = telemetry.subscribe();
    let mut last_printed: Option<TelemetryFrame> = None;
    let mut printed = 0usize;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(SUCCESS);
                }
                let latest = updates.borrow_and_update().clone();
                let Some(frame) = latest else {
                    continue;
                };
                if last_printed.as_ref() == Some(&frame) {
                    continue;
                }
                match frame.to_raw() {
                    Ok(raw) => print_frame(&FrameView::telemetry(&frame, &raw), format),
                    Err(err) => tracing::warn!(error = %err, "cannot render telemetry"),
                }
                last_printed = Some(frame);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break Ok(SUCCESS);
                }
            }
            signal = &mut shutdown => {
                match signal {
                    Ok(()) => {
                        tracing::info!("interrupt received, stopping control session");
                        break Ok(SUCCESS);
                    }
                    Err(err) => break Err(io_error("signal handler setup failed", err)),
                }
            }
        }
    };

    cancel.cancel();
    let publisher_joined = join_loop(publisher_task, "command publisher").await;
    let ingest_joined = join_loop(ingest_task, "telemetry ingest").await;

    let summary = SessionSummary::new(
        *status.borrow(),
        counters.totals(),
        telemetry.load().as_ref(),
    );
    tracing::info!(
        frames_sent = summary.publisher.frames_sent,
        send_failures = summary.publisher.send_failures,
        decoded = summary.telemetry.decoded,
        rejected = summary.telemetry.rejected,
        "control session ended"
    );

    publisher_joined?;
    ingest_joined?;
    outcome
}
