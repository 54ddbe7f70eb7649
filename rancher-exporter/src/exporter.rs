//! Scrape orchestration.
//!
//! Every scrape runs a full cycle under one lock: reset the sink, fetch
//! stacks, services and hosts in that order, reconcile each record and
//! publish the samples of a collection once it has been processed. Nothing
//! but configuration survives from one cycle to the next.

use crate::client::{FetchError, MetadataClient};
use crate::compat::{self, ApiGeneration, Compatibility};
use crate::directory::StackDirectory;
use crate::metrics;
use crate::reconcile::{self, RecordOutcome};
use crate::sink::{self, MetricSink, PrometheusSink, Sample, SinkError};
use rancher_common::{ResourceKind, ResourceRecord};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Settings a scrape cycle reads. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub base_url: String,
    pub hide_system: bool,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to fetch {kind}: {source}")]
    Fetch {
        kind: ResourceKind,
        #[source]
        source: FetchError,
    },
}

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Publishing,
}

/// Per-collection tally of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub records: usize,
    pub emitted: usize,
    pub skipped_system: usize,
    pub skipped_type: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub generation: ApiGeneration,
    pub stacks: CollectionReport,
    pub services: CollectionReport,
    pub hosts: CollectionReport,
}

impl CycleReport {
    /// Records skipped across all collections.
    pub fn skipped(&self) -> usize {
        [self.stacks, self.services, self.hosts]
            .iter()
            .map(|c| c.skipped_system + c.skipped_type)
            .sum()
    }

    fn new(generation: ApiGeneration) -> Self {
        Self {
            generation,
            stacks: CollectionReport::default(),
            services: CollectionReport::default(),
            hosts: CollectionReport::default(),
        }
    }
}

impl CyclePhase {
    fn advance(&mut self, to: CyclePhase) {
        debug_assert!(
            matches!(
                (*self, to),
                (CyclePhase::Idle, CyclePhase::Fetching)
                    | (CyclePhase::Fetching, CyclePhase::Publishing)
                    | (CyclePhase::Publishing, CyclePhase::Fetching)
                    | (_, CyclePhase::Idle)
            ),
            "illegal cycle transition {:?} -> {:?}",
            self,
            to
        );
        debug!(from = ?*self, to = ?to, "cycle phase");
        *self = to;
    }
}

/// Everything a cycle mutates. Only reachable through the exporter's lock.
struct CycleState<S> {
    sink: S,
    directory: StackDirectory,
    phase: CyclePhase,
}

/// Runs scrape cycles against one Rancher API and owns the resource gauges.
pub struct Exporter<S: MetricSink = PrometheusSink> {
    settings: ScrapeSettings,
    client: MetadataClient,
    state: Mutex<CycleState<S>>,
}

impl<S: MetricSink> Exporter<S> {
    pub fn new(settings: ScrapeSettings, client: MetadataClient, sink: S) -> Self {
        Self {
            settings,
            client,
            state: Mutex::new(CycleState {
                sink,
                directory: StackDirectory::new(),
                phase: CyclePhase::Idle,
            }),
        }
    }

    /// Run one cycle. Concurrent callers wait for the running cycle to
    /// finish before starting their own.
    pub async fn scrape(&self) -> Result<CycleReport, ScrapeError> {
        let mut state = self.state.lock().await;
        self.run_cycle(&mut state).await
    }

    /// Encode the current gauges followed by the exporter's own metrics.
    pub async fn encode(&self) -> Result<String, SinkError> {
        let state = self.state.lock().await;
        let mut families = state.sink.gather();
        families.extend(metrics::gather());
        sink::encode_text(&families)
    }

    /// Read the sink without running a cycle.
    #[cfg(test)]
    pub async fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.sink)
    }

    async fn run_cycle(&self, state: &mut CycleState<S>) -> Result<CycleReport, ScrapeError> {
        let start = Instant::now();
        metrics::inc_function_call("exporter", "scrape");

        let result = self.collect(state).await;
        state.phase.advance(CyclePhase::Idle);

        metrics::observe_function_duration("exporter", "scrape", start.elapsed().as_secs_f64());
        metrics::inc_scrape(result.is_ok());

        match &result {
            Ok(report) => info!(
                api = report.generation.as_str(),
                stacks = report.stacks.emitted,
                services = report.services.emitted,
                hosts = report.hosts.emitted,
                skipped = report.skipped(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "scrape complete"
            ),
            Err(ScrapeError::Fetch { kind, source }) => error!(
                collection = %kind,
                url = source.url(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "scrape failed: {}",
                source
            ),
        }
        result
    }

    async fn collect(&self, state: &mut CycleState<S>) -> Result<CycleReport, ScrapeError> {
        let CycleState {
            sink,
            directory,
            phase,
        } = state;
        phase.advance(CyclePhase::Fetching);
        sink.reset();
        directory.clear();

        let compat = compat::resolve(&self.settings.base_url);
        let hide_system = self.settings.hide_system;
        let mut report = CycleReport::new(compat.generation);

        let stacks = self.fetch(&compat, ResourceKind::Stack).await?;
        for record in &stacks {
            if ResourceKind::Stack.accepts_type_tag(record.type_tag()) {
                directory.record(record.id(), record.display_name());
            }
        }
        if directory.is_empty() {
            debug!("no stacks recorded, service stack names will be unknown");
        } else {
            debug!(stacks = directory.len(), "stack directory built");
        }
        report.stacks = publish(sink, phase, &stacks, |record| {
            reconcile::stack_samples(record, hide_system)
        });

        let directory: &StackDirectory = directory;
        let services = self.fetch(&compat, ResourceKind::Service).await?;
        report.services = publish(sink, phase, &services, |record| {
            reconcile::service_samples(record, hide_system, directory, compat.stack_ref_field)
        });

        let hosts = self.fetch(&compat, ResourceKind::Host).await?;
        report.hosts = publish(sink, phase, &hosts, |record| {
            reconcile::host_samples(record, hide_system)
        });

        Ok(report)
    }

    async fn fetch(
        &self,
        compat: &Compatibility,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRecord>, ScrapeError> {
        let url = compat.collection_url(&self.settings.base_url, kind);
        self.client
            .fetch(&url)
            .await
            .map_err(|source| ScrapeError::Fetch { kind, source })
    }
}

/// Reconcile a whole collection, then hand its samples to the sink.
fn publish<S: MetricSink>(
    sink: &mut S,
    phase: &mut CyclePhase,
    records: &[ResourceRecord],
    reconcile_record: impl Fn(&ResourceRecord) -> RecordOutcome,
) -> CollectionReport {
    let mut report = CollectionReport {
        records: records.len(),
        ..CollectionReport::default()
    };
    let mut samples: Vec<Sample> = Vec::new();

    for record in records {
        match reconcile_record(record) {
            RecordOutcome::Emitted(record_samples) => {
                report.emitted += 1;
                samples.extend(record_samples);
            }
            RecordOutcome::SkippedSystem => report.skipped_system += 1,
            RecordOutcome::SkippedTypeTag => report.skipped_type += 1,
        }
    }

    phase.advance(CyclePhase::Publishing);
    report.samples = sink.publish_all(&samples);
    phase.advance(CyclePhase::Fetching);

    debug!(
        records = report.records,
        emitted = report.emitted,
        skipped_system = report.skipped_system,
        skipped_type = report.skipped_type,
        samples = report.samples,
        "collection published"
    );
    report
}
