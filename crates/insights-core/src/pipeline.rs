//! Pipeline orchestrator: generation, miss detection, networks, correlation,
//! centrality and statistics, collected into an [`AnalysisReport`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::centrality::centrality;
use crate::config::InsightsConfig;
use crate::correlation::{build_correlation_graph, build_within_correlation_graph, MetricMeans};
use crate::error::ParamError;
use crate::generator::{ScoreGenerator, SocraticGenerator};
use crate::graph::{build_bipartite_graph, build_co_miss_graph, focused_min_misses};
use crate::misses::{misses, Level, MissCounts};
use crate::model::{MetricSpec, ScoreTable, SocraticLong};
use crate::report::{
    AnalysisReport, CentralitySet, CohortStatistics, CohortSummary, DataSource, FocusedNetwork,
    ReportParameters, StudentProfile,
};
use crate::selection::{select_scores, select_socratic, AttemptWindow, CohortSplit};
use crate::statistics::{
    cohort_criterion_means, cohort_trend, compare_cohorts, criterion_distributions, linear_trend,
    student_criterion_means,
};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Misses,
    Networks,
    Correlation,
    Centrality,
    Statistics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Misses => "misses",
            Stage::Networks => "networks",
            Stage::Correlation => "correlation",
            Stage::Centrality => "centrality",
            Stage::Statistics => "statistics",
        };
        f.write_str(name)
    }
}

/// Progress reporting trait.
pub trait ProgressReporter {
    fn on_stage_start(&self, stage: Stage);
    fn on_stage_complete(&self, stage: Stage, detail: &str);
    fn on_pipeline_complete(&self, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_stage_start(&self, _: Stage) {}
    fn on_stage_complete(&self, _: Stage, _: &str) {}
    fn on_pipeline_complete(&self, _: Duration) {}
}

/// Runs the whole generate → analyse flow for one configuration.
pub struct Pipeline {
    config: InsightsConfig,
}

impl Pipeline {
    pub fn new(config: InsightsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InsightsConfig {
        &self.config
    }

    /// Generate the score and Socratic tables for the configured seed.
    pub fn generate(&self) -> Result<(ScoreTable, SocraticLong), ParamError> {
        self.config.validate()?;
        let g = &self.config.generator;
        let taxonomy = self.config.resolve_taxonomy()?;

        let scores = ScoreGenerator::new(taxonomy, g.trend_model())?.generate(
            g.seed,
            g.n_students,
            g.n_attempts,
        )?;
        let socratic = SocraticGenerator::new(MetricSpec::defaults(), self.config.socratic.clone())?
            .generate(g.seed, g.n_students, g.n_attempts)?;
        Ok((scores, socratic))
    }

    /// Generate both tables and analyse them.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<AnalysisReport, ParamError> {
        let start = Instant::now();
        let g = &self.config.generator;

        reporter.on_stage_start(Stage::Generate);
        let (scores, socratic) = self.generate()?;
        tracing::info!(
            seed = g.seed,
            students = g.n_students,
            attempts = g.n_attempts,
            records = scores.len(),
            "generated tables"
        );
        reporter.on_stage_complete(
            Stage::Generate,
            &format!("{} scores, {} socratic values", scores.len(), socratic.len()),
        );

        let source = DataSource::Generated {
            seed: g.seed,
            n_students: g.n_students,
            n_attempts: g.n_attempts,
        };
        self.analyze_from(source, &scores, &socratic, reporter, start)
    }

    /// Analyse externally supplied tables with the configured analysis
    /// parameters.
    pub fn analyze(
        &self,
        scores: &ScoreTable,
        socratic: &SocraticLong,
        reporter: &dyn ProgressReporter,
    ) -> Result<AnalysisReport, ParamError> {
        self.analyze_from(DataSource::External, scores, socratic, reporter, Instant::now())
    }

    fn analyze_from(
        &self,
        source: DataSource,
        scores: &ScoreTable,
        socratic: &SocraticLong,
        reporter: &dyn ProgressReporter,
        start: Instant,
    ) -> Result<AnalysisReport, ParamError> {
        let a = &self.config.analysis;
        ParamError::ensure_finite("miss_threshold", a.miss_threshold)?;
        ParamError::ensure_range("min_abs_corr", a.min_abs_corr, 0.0, 1.0)?;
        a.attempt_window.validate()?;
        let focus_criterion = a
            .focus_criterion
            .as_deref()
            .map(|name| scores.taxonomy().criterion(name))
            .transpose()?;

        let windowed = select_scores(scores, a.attempt_window, CohortSplit::All);
        let cohort_comparison = compare_cohorts(&windowed, a.compare[0], a.compare[1]);
        let selected_scores = select_scores(&windowed, AttemptWindow::All, a.cohort);
        let members: Option<BTreeSet<String>> = (a.cohort != CohortSplit::All)
            .then(|| selected_scores.student_ids().into_iter().collect());
        let selected_socratic = select_socratic(socratic, a.attempt_window, members.as_ref());
        if !a.attempt_window.is_all() || a.cohort != CohortSplit::All {
            tracing::info!(
                window = %a.attempt_window,
                cohort = %a.cohort,
                records = selected_scores.len(),
                socratic_records = selected_socratic.len(),
                "selected analysis subset"
            );
        }
        if selected_scores.is_empty() {
            tracing::warn!(window = %a.attempt_window, cohort = %a.cohort, "analysis subset is empty");
        }
        let scores = &selected_scores;
        let socratic = &selected_socratic;

        reporter.on_stage_start(Stage::Misses);
        let miss_table = misses(scores, a.miss_threshold)?;
        let miss_counts = miss_table.counts(a.grouping, Level::Criterion);
        let element_counts = miss_table.counts(a.grouping, Level::Element);
        tracing::info!(
            threshold = a.miss_threshold,
            total = miss_table.total_misses(),
            "classified misses"
        );
        reporter.on_stage_complete(
            Stage::Misses,
            &format!("{} misses", miss_table.total_misses()),
        );

        reporter.on_stage_start(Stage::Networks);
        let co_miss = build_co_miss_graph(&miss_counts, a.min_misses);
        let bipartite = build_bipartite_graph(&miss_counts, a.min_misses)?;
        let element_co_miss = build_co_miss_graph(&element_counts, a.min_misses);
        let focus_graph = focus_criterion.map(|criterion| {
            let counts = element_counts.select_columns(&criterion.elements);
            let min_misses = focused_min_misses(counts.columns.len(), a.min_misses);
            tracing::debug!(criterion = %criterion.name, min_misses, "building focused network");
            (criterion.name.clone(), min_misses, build_co_miss_graph(&counts, min_misses))
        });
        tracing::info!(
            co_miss_edges = co_miss.edge_count(),
            bipartite_edges = bipartite.edge_count(),
            element_edges = element_co_miss.edge_count(),
            "built miss networks"
        );
        reporter.on_stage_complete(
            Stage::Networks,
            &format!(
                "{} co-miss edges, {} bipartite edges",
                co_miss.edge_count(),
                bipartite.edge_count()
            ),
        );

        reporter.on_stage_start(Stage::Correlation);
        let assessment_means = MetricMeans::from_scores(scores);
        let socratic_means = MetricMeans::from_socratic(socratic);
        let correlation = build_correlation_graph(&assessment_means, &socratic_means, a.min_abs_corr)?;
        let socratic_correlation = build_within_correlation_graph(&socratic_means, a.min_abs_corr)?;
        tracing::info!(
            edges = correlation.graph.edge_count(),
            skipped = correlation.skipped.len(),
            excluded_students = correlation.excluded_students,
            "built correlation network"
        );
        reporter.on_stage_complete(
            Stage::Correlation,
            &format!(
                "{} edges, {} pairs skipped",
                correlation.graph.edge_count(),
                correlation.skipped.len()
            ),
        );

        reporter.on_stage_start(Stage::Centrality);
        let focus = focus_graph.map(|(criterion, min_misses, graph)| FocusedNetwork {
            criterion,
            min_misses,
            centrality: centrality(&graph),
            graph,
        });
        let centrality = CentralitySet {
            co_miss: centrality(&co_miss),
            bipartite: centrality(&bipartite),
            correlation: centrality(&correlation.graph),
        };
        reporter.on_stage_complete(Stage::Centrality, "");

        reporter.on_stage_start(Stage::Statistics);
        let statistics = CohortStatistics {
            criterion_means: cohort_criterion_means(scores),
            trend: cohort_trend(scores),
            distributions: criterion_distributions(scores),
            linear_trend: linear_trend(scores),
        };
        let student_profile = self.profile(scores, &miss_counts);
        reporter.on_stage_complete(Stage::Statistics, "");

        let elapsed = start.elapsed();
        reporter.on_pipeline_complete(elapsed);
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "analysis complete");

        Ok(AnalysisReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            parameters: ReportParameters {
                source,
                taxonomy: scores.taxonomy().clone(),
                analysis: a.clone(),
            },
            summary: CohortSummary {
                students: scores.student_ids().len(),
                attempts: scores.attempts().len(),
                score_records: scores.len(),
                socratic_records: socratic.len(),
                total_misses: miss_table.total_misses(),
            },
            miss_counts,
            co_miss,
            bipartite,
            element_co_miss,
            correlation,
            socratic_correlation,
            centrality,
            statistics,
            cohort_comparison,
            focus,
            student_profile,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    fn profile(&self, scores: &ScoreTable, counts: &MissCounts) -> Option<StudentProfile> {
        let student_id = self.config.analysis.student_id.trim();
        if student_id.is_empty() {
            return None;
        }
        let Some(criterion_means) = student_criterion_means(scores, student_id) else {
            tracing::warn!(student_id, "student not found; skipping profile");
            return None;
        };
        Some(StudentProfile {
            student_id: student_id.to_string(),
            criterion_means,
            misses: counts
                .rows
                .iter()
                .filter(|row| row.student_id == student_id)
                .cloned()
                .collect(),
        })
    }
}
