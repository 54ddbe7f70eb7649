//! State reconciliation.
//!
//! A resource reports a single raw state string. Prometheus has no notion
//! of an enum, so each tracked attribute is exported as one gauge series per
//! member of its closed state set: 1 for the observed member, 0 for every
//! other. A raw value outside the set yields all zeros, never a new label
//! value.

use crate::compat::StackRefField;
use crate::directory::{StackDirectory, UNKNOWN_STACK};
use crate::sink::{Metric, Sample};
use rancher_common::{
    AgentState, HealthState, HostState, ResourceKind, ResourceRecord, ServiceState, StackState,
    StateSet,
};
use tracing::{debug, warn};

/// One member of a state set and whether it is the observed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator<S> {
    pub state: S,
    pub active: bool,
}

impl<S> Indicator<S> {
    pub fn value(&self) -> f64 {
        if self.active { 1.0 } else { 0.0 }
    }
}

/// Map a raw state onto the full set of `S`.
///
/// The result always has `S::ALL.len()` entries, in set order, with at most
/// one active.
pub fn reconcile<S: StateSet>(raw: &str) -> Vec<Indicator<S>> {
    let observed = S::parse(raw);
    S::ALL
        .iter()
        .map(|&state| Indicator {
            state,
            active: observed == Some(state),
        })
        .collect()
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Emitted(Vec<Sample>),
    /// Hidden because it belongs to the system and system resources are hidden.
    SkippedSystem,
    /// The record's type tag does not belong to the collection it came from.
    SkippedTypeTag,
}

/// Samples for one stack record.
pub fn stack_samples(record: &ResourceRecord, hide_system: bool) -> RecordOutcome {
    if let Some(outcome) = precheck(record, ResourceKind::Stack, hide_system) {
        return outcome;
    }

    let name = record.display_name();
    let system = record.is_system().to_string();
    let mut samples = indicator_samples::<StackState>(record.state(), name, |state| Sample {
        metric: Metric::StackState,
        labels: vec![name.to_string(), state.to_string(), system.clone()],
        value: 0.0,
    });

    if let Some(health) = record.health_state() {
        samples.extend(indicator_samples::<HealthState>(health, name, |state| {
            Sample {
                metric: Metric::StackHealth,
                labels: vec![name.to_string(), state.to_string(), system.clone()],
                value: 0.0,
            }
        }));
    }

    RecordOutcome::Emitted(samples)
}

/// Samples for one service record.
///
/// The owning stack is looked up through `stack_ref`; a stack name carried
/// by the record itself takes precedence.
pub fn service_samples(
    record: &ResourceRecord,
    hide_system: bool,
    directory: &StackDirectory,
    stack_ref: StackRefField,
) -> RecordOutcome {
    if let Some(outcome) = precheck(record, ResourceKind::Service, hide_system) {
        return outcome;
    }

    let name = record.display_name();
    let stack_name = match record.stack_name() {
        Some(stack_name) => stack_name,
        None => {
            let reference = stack_ref.extract(record);
            let resolved = directory.resolve(reference);
            if resolved == UNKNOWN_STACK {
                warn!(
                    service = name,
                    field = stack_ref.json_name(),
                    reference,
                    "could not resolve stack for service"
                );
            }
            resolved
        }
    };

    let mut samples = vec![Sample::new(
        Metric::ServiceScale,
        vec![name.to_string(), stack_name.to_string()],
        record.scale() as f64,
    )];

    samples.extend(indicator_samples::<ServiceState>(
        record.state(),
        name,
        |state| Sample {
            metric: Metric::ServiceState,
            labels: vec![name.to_string(), stack_name.to_string(), state.to_string()],
            value: 0.0,
        },
    ));

    if let Some(health) = record.health_state() {
        samples.extend(indicator_samples::<HealthState>(health, name, |state| {
            Sample {
                metric: Metric::ServiceHealth,
                labels: vec![name.to_string(), stack_name.to_string(), state.to_string()],
                value: 0.0,
            }
        }));
    }

    RecordOutcome::Emitted(samples)
}

/// Samples for one host record.
pub fn host_samples(record: &ResourceRecord, hide_system: bool) -> RecordOutcome {
    if let Some(outcome) = precheck(record, ResourceKind::Host, hide_system) {
        return outcome;
    }

    let name = record.display_name();
    let mut samples = indicator_samples::<HostState>(record.state(), name, |state| Sample {
        metric: Metric::HostState,
        labels: vec![name.to_string(), state.to_string()],
        value: 0.0,
    });

    if let Some(agent) = record.agent_state() {
        samples.extend(indicator_samples::<AgentState>(agent, name, |state| {
            Sample {
                metric: Metric::HostAgentState,
                labels: vec![name.to_string(), state.to_string()],
                value: 0.0,
            }
        }));
    }

    RecordOutcome::Emitted(samples)
}

/// System filtering, then type-tag validation.
fn precheck(record: &ResourceRecord, kind: ResourceKind, hide_system: bool) -> Option<RecordOutcome> {
    if hide_system && record.is_system() {
        debug!(kind = %kind, name = record.display_name(), "skipping system resource");
        return Some(RecordOutcome::SkippedSystem);
    }

    let tag = record.type_tag();
    if !kind.accepts_type_tag(tag) {
        warn!(
            kind = %kind,
            name = record.display_name(),
            type_tag = tag,
            "record type does not match its collection, skipping"
        );
        return Some(RecordOutcome::SkippedTypeTag);
    }

    None
}

/// Expand a raw state into one sample per member of `S`. `template` builds
/// the labels for a member; the value is filled in from the indicator.
fn indicator_samples<S: StateSet>(
    raw: &str,
    name: &str,
    template: impl Fn(S) -> Sample,
) -> Vec<Sample> {
    let indicators = reconcile::<S>(raw);
    if !indicators.iter().any(|i| i.active) {
        debug!(
            name,
            attribute = S::ATTRIBUTE,
            raw,
            "value outside the known set, all indicators are 0"
        );
    }

    indicators
        .into_iter()
        .map(|indicator| {
            let mut sample = template(indicator.state);
            sample.value = indicator.value();
            sample
        })
        .collect()
}
