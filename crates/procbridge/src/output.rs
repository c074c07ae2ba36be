use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use procbridge_rpc::BridgeStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// What a `parent` run observed.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub descriptor: String,
    pub child_exit_code: Option<i32>,
    /// Lines the child printed, one per call result.
    pub results: Vec<String>,
    /// Messages the child sent through fire-and-forget calls.
    pub notifications: Vec<String>,
    pub stats: BridgeStats,
}

pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STEP", "RESULT"]);
            for (step, line) in report.results.iter().enumerate() {
                table.add_row(vec![(step + 1).to_string(), line.clone()]);
            }
            println!("{table}");
            println!(
                "served={} stale={} malformed={} notifications={}",
                report.stats.calls_served,
                report.stats.stale_replies,
                report.stats.malformed_frames,
                report.notifications.len()
            );
        }
        OutputFormat::Pretty => {
            for (step, line) in report.results.iter().enumerate() {
                println!("step={} result={line:?}", step + 1);
            }
            for message in &report.notifications {
                println!("notification={message:?}");
            }
            println!(
                "child_exit_code={} calls_served={}",
                report
                    .child_exit_code
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                report.stats.calls_served
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            for line in &report.results {
                let _ = writeln!(out, "{line}");
            }
            let _ = out.flush();
        }
    }
}

/// Write one result line and flush, so a reading parent sees it immediately.
pub fn print_line(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}
