//! Poll loop
//!
//! Runs snapshot → select → refresh → decide cycles, once or repeatedly with a
//! fixed delay. Cancellation is only observed between cycles, so a cycle that
//! has started (and every series write inside it) always completes.

use super::{CycleOutcome, CycleReport, InstanceFailure, PollMode};
use crate::decision::{DecisionConfig, DecisionEngine};
use crate::inventory::fetch_snapshot;
use crate::models::{Operation, Verdict};
use crate::observability::{FleetMetrics, StructuredLogger};
use crate::provider::{InventoryProvider, MetricsSource, Terminator};
use crate::selector::{select, SelectionCriteria};
use crate::store::{refresh_series, GapFillConfig, MetricSeries, SeriesStore};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

/// Default delay between watch-mode cycles
pub const DEFAULT_WATCH_DELAY: Duration = Duration::from_secs(45);

/// Default decision window (one hour of samples)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Provider region to poll
    pub region: String,
    /// Which instances each cycle acts on
    pub criteria: SelectionCriteria,
    pub mode: PollMode,
    /// Delay between cycles in watch mode (default: 45 seconds)
    pub watch_delay: Duration,
    /// Decision window (default: 1 hour)
    pub window: Duration,
    /// Submit reclaimed instances for termination
    pub reclaim: bool,
    pub decision: DecisionConfig,
    pub gap_fill: GapFillConfig,
    /// Channel buffer size for cycle outcomes
    pub report_buffer: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            region: "us-west-1".to_string(),
            criteria: SelectionCriteria::default(),
            mode: PollMode::Once,
            watch_delay: DEFAULT_WATCH_DELAY,
            window: DEFAULT_WINDOW,
            reclaim: false,
            decision: DecisionConfig::default(),
            gap_fill: GapFillConfig::default(),
            report_buffer: 16,
        }
    }
}

/// Poll loop over the provider's instances
pub struct PollLoop {
    inventory: Arc<dyn InventoryProvider>,
    metrics_source: Arc<dyn MetricsSource>,
    terminator: Arc<dyn Terminator>,
    store: Arc<dyn SeriesStore>,
    engine: DecisionEngine,
    config: PollConfig,
    /// Channel to send cycle outcomes
    outcome_tx: mpsc::Sender<CycleOutcome>,
    metrics: FleetMetrics,
    logger: StructuredLogger,
}

impl PollLoop {
    /// Create a new poll loop
    pub fn new(
        inventory: Arc<dyn InventoryProvider>,
        metrics_source: Arc<dyn MetricsSource>,
        terminator: Arc<dyn Terminator>,
        store: Arc<dyn SeriesStore>,
        config: PollConfig,
    ) -> (Self, mpsc::Receiver<CycleOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::channel(config.report_buffer.max(1));

        let poll_loop = Self {
            inventory,
            metrics_source,
            terminator,
            store,
            engine: DecisionEngine::new(config.decision.clone()),
            logger: StructuredLogger::new(config.region.clone()),
            metrics: FleetMetrics::new(),
            config,
            outcome_tx,
        };

        (poll_loop, outcome_rx)
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run until the configured mode is satisfied or `shutdown` fires.
    ///
    /// Returns the number of cycles that ran.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!(
            region = %self.config.region,
            mode = ?self.config.mode,
            watch_delay_secs = self.config.watch_delay.as_secs(),
            "Starting poll loop"
        );

        let mut cycle = 0u64;
        let reason = loop {
            cycle += 1;
            let outcome = self.run_cycle(cycle).await;

            if self.outcome_tx.send(outcome).await.is_err() {
                debug!(cycle, "Outcome receiver dropped");
            }

            if self.config.mode == PollMode::Once {
                break "single cycle complete";
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.watch_delay) => {}
                _ = shutdown.recv() => {
                    break "shutdown requested";
                }
            }
        };

        self.logger.log_shutdown(reason, cycle);
        cycle
    }

    /// Run one full cycle. Never fails: failures are folded into the outcome.
    pub async fn run_cycle(&self, cycle: u64) -> CycleOutcome {
        let start = Instant::now();
        let started_at = Utc::now();

        let snapshot = match fetch_snapshot(self.inventory.as_ref(), &self.config.region).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.logger.log_cycle_failure(cycle, &e);
                self.metrics.inc_cycles_failed();
                return CycleOutcome::Failed {
                    cycle,
                    operation: Operation::Snapshot,
                    error: e.to_string(),
                };
            }
        };

        let selected = select(&snapshot, &self.config.criteria);
        let mut report = CycleReport {
            cycle,
            started_at,
            elapsed_ms: 0,
            selected: selected.iter().map(|r| r.id.clone()).collect(),
            decisions: Default::default(),
            failures: Vec::new(),
            terminated: Vec::new(),
        };

        let series = self.refresh_all(cycle, &report.selected, &mut report.failures).await;

        report.decisions = self.engine.decide_all(series.iter(), self.config.window);
        for decision in &report.decisions.decisions {
            self.logger.log_decision(cycle, decision);
        }

        if self.config.reclaim {
            report.terminated = self.reclaim(cycle, &report.decisions.reclaim_ids(), &mut report.failures).await;
        }

        let elapsed = start.elapsed();
        report.elapsed_ms = elapsed.as_millis() as u64;

        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());
        self.metrics.inc_cycles_completed();
        self.metrics.set_cycle_totals(
            report.selected.len(),
            report.decisions.reclaimed().count(),
            report.decisions.abstained.len(),
        );
        self.logger.log_cycle_complete(
            cycle,
            report.selected.len(),
            report.decisions.retained().count(),
            report.decisions.reclaimed().count(),
            report.failures.len(),
            elapsed.as_millis(),
        );

        CycleOutcome::Completed(report)
    }

    /// Refresh every selected series; a failing instance is recorded and skipped
    async fn refresh_all(
        &self,
        cycle: u64,
        instance_ids: &[String],
        failures: &mut Vec<InstanceFailure>,
    ) -> Vec<MetricSeries> {
        let now = Utc::now();
        let mut series = Vec::with_capacity(instance_ids.len());

        for instance_id in instance_ids {
            match refresh_series(
                self.store.as_ref(),
                self.metrics_source.as_ref(),
                instance_id,
                now,
                &self.config.gap_fill,
            )
            .await
            {
                Ok(refreshed) => {
                    if refreshed.plan.range().is_some() {
                        self.metrics.inc_metric_fetches();
                    }
                    series.push(refreshed.series);
                }
                Err(e) => {
                    self.logger
                        .log_instance_failure(cycle, instance_id, e.operation, &e.source);
                    self.metrics.inc_instance_failures();
                    failures.push(InstanceFailure {
                        instance_id: instance_id.clone(),
                        operation: e.operation,
                        error: e.source.to_string(),
                    });
                }
            }
        }

        series
    }

    /// Submit each reclaimed instance separately so one rejection does not block the rest
    async fn reclaim(
        &self,
        cycle: u64,
        instance_ids: &[String],
        failures: &mut Vec<InstanceFailure>,
    ) -> Vec<String> {
        let mut submitted = Vec::with_capacity(instance_ids.len());

        for instance_id in instance_ids {
            match self
                .terminator
                .terminate(&self.config.region, std::slice::from_ref(instance_id))
                .await
            {
                Ok(()) => submitted.push(instance_id.clone()),
                Err(e) => {
                    self.logger
                        .log_instance_failure(cycle, instance_id, Operation::Terminate, &e);
                    self.metrics.inc_instance_failures();
                    failures.push(InstanceFailure {
                        instance_id: instance_id.clone(),
                        operation: Operation::Terminate,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !submitted.is_empty() {
            self.logger.log_termination(cycle, &submitted, Verdict::Reclaim);
            self.metrics.add_terminations_submitted(submitted.len());
        }
        submitted
    }
}

/// Builder for creating the poll loop
pub struct PollLoopBuilder {
    inventory: Option<Arc<dyn InventoryProvider>>,
    metrics_source: Option<Arc<dyn MetricsSource>>,
    terminator: Option<Arc<dyn Terminator>>,
    store: Option<Arc<dyn SeriesStore>>,
    config: PollConfig,
}

impl PollLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            inventory: None,
            metrics_source: None,
            terminator: None,
            store: None,
            config: PollConfig::default(),
        }
    }

    /// Use one provider for inventory, metrics and termination
    pub fn provider<P>(self, provider: Arc<P>) -> Self
    where
        P: InventoryProvider + MetricsSource + Terminator + 'static,
    {
        self.inventory(provider.clone())
            .metrics_source(provider.clone())
            .terminator(provider)
    }

    pub fn inventory(mut self, inventory: Arc<dyn InventoryProvider>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(source);
        self
    }

    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn store(mut self, store: Arc<dyn SeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.config.criteria = criteria;
        self
    }

    pub fn mode(mut self, mode: PollMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn watch_delay(mut self, delay: Duration) -> Self {
        self.config.watch_delay = delay;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn reclaim(mut self, reclaim: bool) -> Self {
        self.config.reclaim = reclaim;
        self
    }

    pub fn decision(mut self, decision: DecisionConfig) -> Self {
        self.config.decision = decision;
        self
    }

    pub fn gap_fill(mut self, gap_fill: GapFillConfig) -> Self {
        self.config.gap_fill = gap_fill;
        self
    }

    /// Build the poll loop
    pub fn build(self) -> Result<(PollLoop, mpsc::Receiver<CycleOutcome>)> {
        let inventory = self
            .inventory
            .ok_or_else(|| anyhow::anyhow!("Inventory provider is required"))?;
        let metrics_source = self
            .metrics_source
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let terminator = self
            .terminator
            .ok_or_else(|| anyhow::anyhow!("Terminator is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Series store is required"))?;

        Ok(PollLoop::new(
            inventory,
            metrics_source,
            terminator,
            store,
            self.config,
        ))
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
