use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gantrylink_control::{IngestTotals, PublisherStatus};
use gantrylink_frame::{kind_name, CommandFrame, ControlState, RawCanFrame, TelemetryFrame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Flat view of a decoded gantry frame. Telemetry reports measured values
/// in the `feed`/`x`/`y` columns.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FrameView {
    pub kind: &'static str,
    pub arbiter_id: u32,
    pub payload: String,
    pub state: &'static str,
    pub feed: i16,
    pub x: i16,
    pub y: i16,
    pub relative: bool,
    pub jog: bool,
    pub pto_bits: u8,
}

impl FrameView {
    pub fn command(frame: &CommandFrame, raw: &RawCanFrame) -> Self {
        Self::build(
            raw,
            frame.state_request,
            [frame.feed, frame.x, frame.y],
            (frame.relative, frame.jog, frame.pto_bits),
        )
    }

    pub fn telemetry(frame: &TelemetryFrame, raw: &RawCanFrame) -> Self {
        Self::build(
            raw,
            frame.state,
            [frame.meas_feed, frame.meas_x, frame.meas_y],
            (frame.relative, frame.jog, frame.pto_bits),
        )
    }

    fn build(
        raw: &RawCanFrame,
        state: ControlState,
        [feed, x, y]: [i16; 3],
        (relative, jog, pto_bits): (bool, bool, u8),
    ) -> Self {
        Self {
            kind: kind_name(raw.id),
            arbiter_id: raw.id,
            payload: raw.hex(),
            state: state.label(),
            feed,
            x,
            y,
            relative,
            jog,
            pto_bits,
        }
    }
}

pub fn print_frame(view: &FrameView, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(view).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "KIND", "ID", "STATE", "FEED", "X", "Y", "REL", "JOG", "PTO", "PAYLOAD",
                ])
                .add_row(vec![
                    view.kind.to_string(),
                    format!("{:#05x}", view.arbiter_id),
                    view.state.to_string(),
                    view.feed.to_string(),
                    view.x.to_string(),
                    view.y.to_string(),
                    view.relative.to_string(),
                    view.jog.to_string(),
                    format!("{:#04x}", view.pto_bits),
                    view.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} id={:#05x} state={} feed={} x={} y={} relative={} jog={} pto={:#04x} payload={}",
                view.kind,
                view.arbiter_id,
                view.state,
                view.feed,
                view.x,
                view.y,
                view.relative,
                view.jog,
                view.pto_bits,
                view.payload
            );
        }
    }
}

/// Totals printed when a control session ends.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub publisher: PublisherStatus,
    pub telemetry: IngestTotals,
    pub last_state: Option<&'static str>,
}

impl SessionSummary {
    pub fn new(
        publisher: PublisherStatus,
        telemetry: IngestTotals,
        last: Option<&TelemetryFrame>,
    ) -> Self {
        Self {
            publisher,
            telemetry,
            last_state: last.map(|frame| frame.state.label()),
        }
    }
}

pub fn print_summary(summary: &SessionSummary, format: OutputFormat) {
    let last_state = summary.last_state.unwrap_or("-");
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"])
                .add_row(vec![
                    "publisher".to_string(),
                    summary.publisher.state.to_string(),
                ])
                .add_row(vec![
                    "frames_sent".to_string(),
                    summary.publisher.frames_sent.to_string(),
                ])
                .add_row(vec![
                    "send_failures".to_string(),
                    summary.publisher.send_failures.to_string(),
                ])
                .add_row(vec![
                    "telemetry_decoded".to_string(),
                    summary.telemetry.decoded.to_string(),
                ])
                .add_row(vec![
                    "telemetry_skipped".to_string(),
                    summary.telemetry.skipped.to_string(),
                ])
                .add_row(vec![
                    "telemetry_rejected".to_string(),
                    summary.telemetry.rejected.to_string(),
                ])
                .add_row(vec!["last_state".to_string(), last_state.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "publisher={} sent={} failures={} decoded={} skipped={} rejected={} last_state={}",
                summary.publisher.state,
                summary.publisher.frames_sent,
                summary.publisher.send_failures,
                summary.telemetry.decoded,
                summary.telemetry.skipped,
                summary.telemetry.rejected,
                last_state
            );
        }
    }
}
