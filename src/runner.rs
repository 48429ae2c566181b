//! Run orchestration.
//!
//! A run moves through four states: resolving scope, dispatching jobs,
//! collecting results and reporting. Jobs run on a fixed-size rayon pool;
//! a failure in one job never affects its siblings.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{extract, DocumentableUnit};
use crate::cache::{signature_hash, CacheKey, CacheStats, DocCache};
use crate::config::{OutputMode, ProviderKind, RunConfig};
use crate::plan::{self, read_source, unified_diff, write_atomic, EditKind, UnitDecision};
use crate::scope::{self, select_units, Job, ScopeMode};
use crate::synth::{build_synthesizer, GeneratedDoc, SynthesisError, Synthesizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Io,
    Parse,
    Plan,
    Synthesis,
}

/// A per-file or per-unit failure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Failure {
    pub file: String,
    /// Unit name path; absent for file-level failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

/// An authentication failure, reported once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSummary {
    pub provider_id: String,
    pub reason: String,
    pub affected_units: usize,
}

/// Outcome of one job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub file: String,
    pub ok: bool,
    pub units: usize,
    pub decisions: Vec<UnitDecision>,
    pub synthesized: usize,
    pub cache_hits: usize,
    pub written: bool,
    #[serde(skip)]
    pub diff: String,
    #[serde(skip)]
    pub(crate) failures: Vec<Failure>,
    /// Provider id, reason and affected unit count of an auth failure.
    #[serde(skip)]
    pub(crate) auth: Option<(String, String, usize)>,
    /// Every unit of the file went through the cache.
    #[serde(skip)]
    pub(crate) cache_complete: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub files: usize,
    pub files_failed: usize,
    pub units: usize,
    /// Inserts plus replaces.
    pub edits: usize,
    pub inserts: usize,
    pub replaces: usize,
    pub skips: usize,
    pub synthesis_calls: usize,
    pub cache_hits: usize,
    pub files_written: usize,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scope: &'static str,
    pub mode: &'static str,
    pub provider_id: String,
    pub totals: Totals,
    pub files: Vec<FileReport>,
    /// Sorted by file, then unit.
    pub failures: Vec<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_failure: Option<AuthSummary>,
    pub cache: CacheStats,
    pub pruned: usize,
    /// Unified diff across all files, in file order. Empty in apply mode.
    pub diff: String,
}

/// The documentation engine. Usable as a library without the CLI.
pub struct Engine {
    config: Arc<RunConfig>,
    synthesizer: Box<dyn Synthesizer>,
    cache: DocCache,
}

impl Engine {
    /// Build an engine with the synthesizer selected by the configuration.
    pub fn new(config: RunConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let provider = &config.provider;
        if provider.provider != ProviderKind::Nltk && !provider.ai_enabled {
            warn!(
                "provider {} requires --enable-ai; using the local provider",
                provider.provider
            );
        }
        let synthesizer = build_synthesizer(provider)?;
        Self::with_synthesizer(config, synthesizer)
    }

    /// Build an engine around a given synthesizer.
    pub fn with_synthesizer(
        config: RunConfig,
        synthesizer: Box<dyn Synthesizer>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        if let Some(clang) = &config.clang_path {
            if clang.exists() {
                debug!("clang path {} (C/C++ uses the built-in grammar)", clang.display());
            } else {
                warn!("clang path {} does not exist", clang.display());
            }
        }
        let cache = DocCache::new(&config.cache);
        Ok(Self {
            config: Arc::new(config),
            synthesizer,
            cache,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the run.
    ///
    /// Only scope and pool setup errors are returned; per-file and per-unit
    /// failures are collected in the report.
    pub fn run(&self) -> anyhow::Result<RunReport> {
        debug!("state: resolving scope");
        let (scope_mode, jobs) = scope::resolve(&self.config)?;
        info!("{} files in scope", jobs.len());

        debug!("state: dispatching {} jobs", jobs.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .build()?;

        let progress = if self.config.progress && !jobs.is_empty() {
            let bar = ProgressBar::new(jobs.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let files: Vec<FileReport> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let report = self.process_job(job);
                    progress.inc(1);
                    report
                })
                .collect()
        });
        progress.finish_and_clear();

        debug!("state: collecting results");
        let report = self.collect(scope_mode, files);

        debug!("state: reporting");
        Ok(report)
    }

    fn collect(&self, scope_mode: ScopeMode, files: Vec<FileReport>) -> RunReport {
        let mut totals = Totals {
            files: files.len(),
            ..Default::default()
        };
        let mut failures = Vec::new();
        let mut auth_failure: Option<AuthSummary> = None;
        let mut diff = String::new();
        let mut processed = HashSet::new();

        for file in &files {
            if !file.ok {
                totals.files_failed += 1;
            }
            if file.cache_complete {
                processed.insert(file.file.clone());
            }
            totals.units += file.units;
            totals.synthesis_calls += file.synthesized;
            totals.cache_hits += file.cache_hits;
            for decision in &file.decisions {
                match decision.kind {
                    EditKind::Insert => totals.inserts += 1,
                    EditKind::Replace => totals.replaces += 1,
                    EditKind::Skip => totals.skips += 1,
                }
            }
            if file.written {
                totals.files_written += 1;
            }
            diff.push_str(&file.diff);
            failures.extend(file.failures.iter().cloned());

            if let Some((provider_id, reason, count)) = &file.auth {
                let summary = auth_failure.get_or_insert_with(|| AuthSummary {
                    provider_id: provider_id.clone(),
                    reason: reason.clone(),
                    affected_units: 0,
                });
                summary.affected_units += count;
            }
        }
        totals.edits = totals.inserts + totals.replaces;
        failures.sort();

        let pruned = if self.config.cache.prune && self.cache.is_enabled() {
            let removed = self.cache.prune(&processed);
            info!("pruned {} stale cache entries", removed);
            removed
        } else {
            0
        };

        RunReport {
            scope: match scope_mode {
                ScopeMode::File => "file",
                ScopeMode::Selection => "selection",
                ScopeMode::Workspace => "workspace",
            },
            mode: match self.config.mode {
                OutputMode::Diff => "diff",
                OutputMode::InPlace => "inplace",
            },
            provider_id: self.synthesizer.provider_id().to_string(),
            totals,
            files,
            failures,
            auth_failure,
            cache: self.cache.stats(),
            pruned,
            diff,
        }
    }

    /// Process one file end to end.
    fn process_job(&self, job: &Job) -> FileReport {
        let mut report = FileReport {
            file: job.file_identity.clone(),
            ..Default::default()
        };
        let file_failure = |report: &mut FileReport, kind: FailureKind, message: String| {
            report.ok = false;
            report.failures.push(Failure {
                file: job.file_identity.clone(),
                unit: None,
                kind,
                message,
            });
        };

        let bytes = match read_source(&job.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                file_failure(&mut report, FailureKind::Io, e.to_string());
                return report;
            }
        };
        let units = match extract(&job.path, &bytes, job.language) {
            Ok(units) => units,
            Err(e) => {
                debug!("parse failed: {}", e);
                file_failure(&mut report, FailureKind::Parse, e.reason);
                return report;
            }
        };
        // extract() has checked the encoding
        let source = String::from_utf8_lossy(&bytes).into_owned();

        let units = match job.selection {
            Some(range) => select_units(units, range),
            None => units,
        };
        report.units = units.len();
        report.ok = true;

        if !self.config.provider.enabled {
            return report;
        }

        let mut generated: Vec<(&DocumentableUnit, GeneratedDoc)> = Vec::new();
        for unit in &units {
            match self.generate(job, unit, &mut report) {
                Ok(doc) => generated.push((unit, doc)),
                Err(SynthesisError::Auth(e)) => {
                    let entry = report
                        .auth
                        .get_or_insert_with(|| (e.provider_id.clone(), e.reason.clone(), 0));
                    entry.2 += 1;
                }
                Err(e) => report.failures.push(Failure {
                    file: job.file_identity.clone(),
                    unit: Some(unit.name_path.clone()),
                    kind: FailureKind::Synthesis,
                    message: e.to_string(),
                }),
            }
        }

        report.cache_complete = job.selection.is_none();

        let file_plan = match plan::plan(&source, generated.iter().map(|(u, d)| (*u, d))) {
            Ok(p) => p,
            Err(e) => {
                file_failure(&mut report, FailureKind::Plan, e.to_string());
                return report;
            }
        };
        report.decisions = file_plan.decisions.clone();
        if !file_plan.has_edits() {
            return report;
        }

        let edited = file_plan.apply(&source);
        match self.config.mode {
            OutputMode::Diff => {
                report.diff = unified_diff(&job.file_identity, &source, &edited);
            }
            OutputMode::InPlace => {
                if edited != source {
                    match write_atomic(&job.path, &edited) {
                        Ok(()) => {
                            debug!("wrote {}", job.file_identity);
                            report.written = true;
                        }
                        Err(e) => file_failure(&mut report, FailureKind::Io, e.to_string()),
                    }
                }
            }
        }
        report
    }

    /// Cached or freshly synthesized doc for one unit.
    fn generate(
        &self,
        job: &Job,
        unit: &DocumentableUnit,
        report: &mut FileReport,
    ) -> Result<GeneratedDoc, SynthesisError> {
        let key = CacheKey::new(
            &job.file_identity,
            unit,
            signature_hash(unit),
            &self.synthesizer.fingerprint(),
        );
        if let Some(doc) = self.cache.lookup(&key) {
            report.cache_hits += 1;
            return Ok(doc);
        }

        report.synthesized += 1;
        let doc = self.synthesizer.synthesize(unit)?;
        self.cache.store(&key, &doc);
        Ok(doc)
    }
}
