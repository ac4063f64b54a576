//! Ticker resolution
//! Explicit notation first, company names as a fallback, merged per record

pub mod explicit;
pub mod merge;
pub mod names;

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::ResolutionConfig;
use crate::data::{CleanedRecord, ResolutionReason, ResolutionResult, ResolutionSource, ResolvedRecord};
use crate::registry::Registry;

pub use explicit::ExplicitOutcome;
pub use merge::merge;
pub use names::NameOutcome;

/// Every intermediate output for one record, kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionTrace {
    pub explicit: ExplicitOutcome,
    /// `None` when the explicit stage already accepted.
    pub name: Option<NameOutcome>,
    pub result: ResolutionResult,
}

pub fn trace_record(record: &CleanedRecord, registry: &Registry, config: &ResolutionConfig) -> ResolutionTrace {
    let explicit = explicit::extract(record, config);
    let name = if explicit.is_accepted(config.explicit_accept_threshold) {
        None
    } else {
        Some(names::resolve(record, registry, config))
    };
    let result = merge(&record.event_id, &explicit, name.as_ref(), config);

    ResolutionTrace {
        explicit,
        name,
        result,
    }
}

/// Resolve a single record. Deterministic for a given registry and config.
pub fn resolve_record(record: &CleanedRecord, registry: &Registry, config: &ResolutionConfig) -> ResolutionResult {
    trace_record(record, registry, config).result
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub total: usize,
    pub accepted_explicit: usize,
    pub accepted_name: usize,
    pub rejected_ambiguous: usize,
    pub rejected_low_confidence: usize,
    pub rejected_no_match: usize,
    pub passed_through: usize,
}

impl ResolutionReport {
    fn count(&mut self, result: &ResolutionResult) {
        self.total += 1;
        match (result.resolution_source, result.reason) {
            (ResolutionSource::Explicit, _) => self.accepted_explicit += 1,
            (ResolutionSource::NameMatch, _) => self.accepted_name += 1,
            (ResolutionSource::None, ResolutionReason::Ambiguous) => self.rejected_ambiguous += 1,
            (ResolutionSource::None, ResolutionReason::LowConfidence) => self.rejected_low_confidence += 1,
            (ResolutionSource::None, _) => self.rejected_no_match += 1,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted_explicit + self.accepted_name
    }
}

/// Resolve records in parallel. Results keep input order; records accepted
/// in `previous` are carried over unchanged, earlier rejections are resolved
/// again against the current registry.
pub fn resolve_batch(
    records: &[CleanedRecord],
    registry: &Registry,
    config: &ResolutionConfig,
    previous: &HashMap<String, ResolutionResult>,
) -> (Vec<ResolutionResult>, ResolutionReport) {
    let resolved: Vec<(ResolutionResult, bool)> = records
        .par_iter()
        .map(|record| match previous.get(&record.event_id) {
            Some(prior) if prior.is_accepted() => (prior.clone(), true),
            _ => (resolve_record(record, registry, config), false),
        })
        .collect();

    let mut report = ResolutionReport::default();
    let mut results = Vec::with_capacity(resolved.len());
    for (result, passed_through) in resolved {
        report.count(&result);
        if passed_through {
            report.passed_through += 1;
        } else {
            debug!(
                event_id = %result.event_id,
                status = ?result.status,
                reason = %result.reason,
                "Resolved record"
            );
        }
        results.push(result);
    }

    info!(
        total = report.total,
        accepted_explicit = report.accepted_explicit,
        accepted_name = report.accepted_name,
        rejected_ambiguous = report.rejected_ambiguous,
        rejected_low_confidence = report.rejected_low_confidence,
        rejected_no_match = report.rejected_no_match,
        passed_through = report.passed_through,
        "Resolution batch complete"
    );

    (results, report)
}

/// Pair accepted results with their records, in record order.
pub fn join_accepted(records: &[CleanedRecord], results: &[ResolutionResult]) -> Vec<ResolvedRecord> {
    let by_id: HashMap<&str, &ResolutionResult> = results
        .iter()
        .filter(|r| r.is_accepted())
        .map(|r| (r.event_id.as_str(), r))
        .collect();

    records
        .iter()
        .filter_map(|record| {
            by_id.get(record.event_id.as_str()).map(|result| ResolvedRecord {
                record: record.clone(),
                resolution: (*result).clone(),
            })
        })
        .collect()
}
