//! Utilization refresh and retain/reclaim verdicts

use super::Session;
use crate::output::{
    color_utilization, color_verdict, error_line, print_error, print_json, render_table,
    success_line, warning_line, OutputFormat,
};
use anyhow::{Context, Result};
use colored::Colorize;
use fleet_lib::decision::DecisionConfig;
use fleet_lib::poll::{CycleOutcome, CycleReport, PollConfig, PollLoopBuilder, PollMode};
use fleet_lib::store::FileSeriesStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tokio::sync::broadcast;
use tracing::debug;

pub struct CpuOptions {
    pub watch: bool,
    pub drop: bool,
    pub window_hours: u64,
    pub watch_delay_secs: u64,
    pub threshold: f64,
    pub data_dir: PathBuf,
}

#[derive(Tabled, Serialize)]
struct DecisionRow {
    #[tabled(rename = "INSTANCE")]
    instance_id: String,
    #[tabled(rename = "MEAN CPU")]
    mean: String,
    #[tabled(rename = "SAMPLES")]
    samples: usize,
    #[tabled(rename = "VERDICT")]
    verdict: String,
}

fn decision_rows(report: &CycleReport, threshold: f64) -> Vec<DecisionRow> {
    report
        .decisions
        .decisions
        .iter()
        .map(|d| DecisionRow {
            instance_id: d.id.clone(),
            mean: color_utilization(d.mean_value, threshold),
            samples: d.samples,
            verdict: color_verdict(d.verdict),
        })
        .collect()
}

/// Text of one completed cycle; the decisions table is omitted when nothing got a verdict
fn render_report(report: &CycleReport, threshold: f64) -> String {
    let mut lines = vec![format!(
        "{} {} ({} selected, {} ms)",
        "Cycle".bold(),
        report.cycle,
        report.selected.len(),
        report.elapsed_ms
    )];

    if !report.decisions.is_empty() {
        lines.push(render_table(&decision_rows(report, threshold)));
    }
    if !report.decisions.abstained.is_empty() {
        lines.push(warning_line(&format!(
            "No data yet for: {}",
            report.decisions.abstained.join(", ")
        )));
    }
    for failure in &report.failures {
        lines.push(error_line(&format!(
            "{} {}: {}",
            failure.instance_id, failure.operation, failure.error
        )));
    }
    if !report.terminated.is_empty() {
        lines.push(success_line(&format!(
            "Submitted for termination: {}",
            report.terminated.join(" ")
        )));
    }
    lines.join("\n")
}

fn print_outcome(outcome: &CycleOutcome, format: OutputFormat, threshold: f64) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Table => match outcome {
            CycleOutcome::Completed(report) => {
                println!("{}\n", render_report(report, threshold));
                Ok(())
            }
            CycleOutcome::Failed { cycle, error, .. } => {
                print_error(&format!("Cycle {} failed: {}", cycle, error));
                Ok(())
            }
        },
    }
}

/// Run the poll loop once, or until Ctrl-C with `--watch`
pub async fn run(session: &Session, options: CpuOptions) -> Result<()> {
    let store = FileSeriesStore::open(&options.data_dir).with_context(|| {
        format!("Failed to open data directory {}", options.data_dir.display())
    })?;

    let config = PollConfig {
        region: session.region.clone(),
        criteria: session.criteria.clone(),
        mode: if options.watch {
            PollMode::Watch
        } else {
            PollMode::Once
        },
        watch_delay: Duration::from_secs(options.watch_delay_secs),
        window: Duration::from_secs(options.window_hours * 3600),
        reclaim: options.drop,
        decision: DecisionConfig {
            reclaim_threshold: options.threshold,
            ..Default::default()
        },
        ..PollConfig::default()
    };
    debug!(
        region = %config.region,
        data_dir = %options.data_dir.display(),
        mode = ?config.mode,
        "Starting cpu command"
    );

    let (poll_loop, mut outcomes) = PollLoopBuilder::new()
        .provider(Arc::new(session.provider()))
        .store(Arc::new(store))
        .config(config)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });
    let handle = tokio::spawn(poll_loop.run(shutdown_rx));

    let mut last_failed = false;
    while let Some(outcome) = outcomes.recv().await {
        last_failed = outcome.report().is_none();
        print_outcome(&outcome, session.format, options.threshold)?;
    }
    handle.await.context("Poll loop task failed")?;

    // A single run that could not list instances is a command failure
    if last_failed && !options.watch {
        anyhow::bail!("Could not fetch the instance inventory");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_lib::decision::DecisionSet;
    use fleet_lib::{Decision, Verdict};

    #[test]
    fn test_decision_rows_follow_selection_order() {
        colored::control::set_override(false);
        let report = CycleReport {
            cycle: 1,
            started_at: Utc::now(),
            elapsed_ms: 5,
            selected: vec!["i-b".to_string(), "i-a".to_string()],
            decisions: DecisionSet {
                decisions: vec![
                    Decision {
                        id: "i-b".to_string(),
                        mean_value: 60.0,
                        samples: 2,
                        verdict: Verdict::Retain,
                    },
                    Decision {
                        id: "i-a".to_string(),
                        mean_value: 35.0,
                        samples: 2,
                        verdict: Verdict::Reclaim,
                    },
                ],
                abstained: Vec::new(),
            },
            failures: Vec::new(),
            terminated: Vec::new(),
        };

        let rows = decision_rows(&report, 55.0);
        assert_eq!(rows[0].instance_id, "i-b");
        assert_eq!(rows[0].mean, "60.0%");
        assert_eq!(rows[1].verdict, "reclaim");
    }

    #[test]
    fn test_all_abstained_report_has_no_empty_table() {
        colored::control::set_override(false);
        let report = CycleReport {
            cycle: 2,
            started_at: Utc::now(),
            elapsed_ms: 5,
            selected: vec!["i-new".to_string()],
            decisions: DecisionSet {
                decisions: Vec::new(),
                abstained: vec!["i-new".to_string()],
            },
            failures: Vec::new(),
            terminated: Vec::new(),
        };

        let text = render_report(&report, 55.0);
        assert!(text.contains("1 selected"));
        assert!(text.contains("No data yet for: i-new"));
        assert!(!text.contains("No instances selected"));
        assert!(!text.contains("INSTANCE"));
    }
}
