//! Pipeline shared by the CLI and library callers.
//! Validation, evaluation and layout in order, with file loading at the edge.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::diagnostics::{Alert, AlertCode, AlertLevel};
use crate::graph::{TopologyGraph, TopologyStats};
use crate::layout::{build_layout, CoordinateOverride, LayoutConfig, LayoutResult};
use crate::model::Network;
use crate::topology::{apply_load_counts, evaluate, validate, Evaluation, ValidationReport};

#[derive(Debug, thiserror::Error)]
pub enum OnelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

/// Options for a pipeline run.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub layout: LayoutConfig,
    pub overrides: Vec<CoordinateOverride>,
    /// Stop after evaluation
    pub skip_layout: bool,
}

/// Outcome of every phase that ran.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Input network with load references rewritten and, once evaluated,
    /// synthetic buses and resolved branches written back
    pub network: Network,
    pub validation: ValidationReport,
    pub evaluation: Option<Evaluation>,
    pub layout: Option<LayoutResult>,
    /// Alerts raised by the pipeline itself (island checks)
    pub alerts: Vec<Alert>,
    pub topology: Option<TopologyStats>,
    pub stats: PipelineStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl PipelineResult {
    /// Every phase that ran finished without errors
    pub fn ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.stats.errors > 0
    }

    pub fn total_diagnostics(&self) -> usize {
        self.stats.errors + self.stats.warnings + self.stats.infos
    }

    /// Alerts from evaluation, the pipeline and layout, in that order
    pub fn all_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.evaluation
            .iter()
            .flat_map(|e| e.alerts.iter())
            .chain(self.alerts.iter())
            .chain(self.layout.iter().flat_map(|l| l.warnings.iter()))
    }

    fn tally(&mut self) {
        let mut stats = PipelineStats {
            errors: self.validation.errors.len(),
            warnings: self.validation.warnings.len(),
            infos: 0,
        };
        for alert in self.all_alerts() {
            match alert.level {
                AlertLevel::Error => stats.errors += 1,
                AlertLevel::Warning => stats.warnings += 1,
                AlertLevel::Info => stats.infos += 1,
            }
        }
        self.stats = stats;
    }
}

/// Pipeline API used by both the CLI and embedding callers.
pub struct OnelineCore;

impl OnelineCore {
    /// Validation only.
    pub fn validate(network: &Network) -> ValidationReport {
        validate(
            &network.buses,
            &network.loads,
            &network.branches(),
            &network.passives(),
        )
    }

    /// Validation and evaluation, no layout.
    pub fn resolve(network: Network) -> PipelineResult {
        Self::execute(
            network,
            &PipelineOptions {
                skip_layout: true,
                ..PipelineOptions::default()
            },
        )
    }

    /// Full pipeline.
    ///
    /// # Errors
    ///
    /// Returns `OnelineError::Config` if the layout config is out of range.
    /// Topology problems are never errors; they are reported in the result.
    pub fn run(network: Network, options: &PipelineOptions) -> Result<PipelineResult, OnelineError> {
        options.layout.validate()?;
        Ok(Self::execute(network, options))
    }

    fn execute(mut network: Network, options: &PipelineOptions) -> PipelineResult {
        let validation = Self::validate(&network);
        tracing::info!(
            "Validation: {} errors, {} warnings",
            validation.errors.len(),
            validation.warnings.len()
        );

        network.loads = validation.loads.clone();
        let mut result = PipelineResult {
            network,
            validation,
            evaluation: None,
            layout: None,
            alerts: Vec::new(),
            topology: None,
            stats: PipelineStats::default(),
        };

        if !result.validation.ok {
            result.tally();
            return result;
        }

        result
            .network
            .buses
            .extend(result.validation.synthetic_buses.iter().cloned());

        let passives = result.network.passives();
        let evaluation = evaluate(
            result.network.buses.clone(),
            result.network.branches(),
            &passives,
        );
        tracing::info!(
            "Evaluation: {} branches resolved, {} buses created",
            evaluation.branches.len(),
            evaluation.created_buses.len()
        );
        result.network.buses = evaluation.buses.clone();
        result.network.set_branches(evaluation.branches.clone());

        let graph = TopologyGraph::from_buses(&result.network.buses);
        for island in graph.islands_without_source() {
            let alert = Alert::warning(
                AlertCode::IslandWithoutSource,
                format!("Buses {} are not connected to any source bus", island.join(", ")),
            );
            tracing::warn!("{}", alert.message);
            result.alerts.push(alert);
        }
        result.topology = Some(graph.stats());

        let proceed = evaluation.ok() && !options.skip_layout;
        result.evaluation = Some(evaluation);
        if !proceed {
            result.tally();
            return result;
        }

        apply_load_counts(&mut result.network.buses, &result.validation.load_counts);
        let layout = build_layout(
            &result.network.buses,
            &result.network.branches(),
            &passives,
            &options.overrides,
            &options.layout,
        );
        result.network.buses = layout.buses.clone();
        result.layout = Some(layout);

        result.tally();
        result
    }

    /// Read a network from a JSON file.
    pub fn load_network(path: &Path) -> Result<Network, OnelineError> {
        let content = fs::read_to_string(path)?;
        let network = serde_json::from_str(&content)?;
        Ok(network)
    }

    /// Read saved coordinate overrides from a JSON array file.
    pub fn load_overrides(path: &Path) -> Result<Vec<CoordinateOverride>, OnelineError> {
        let content = fs::read_to_string(path)?;
        let overrides = serde_json::from_str(&content)?;
        Ok(overrides)
    }
}
