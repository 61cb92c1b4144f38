//! Catalog filtering and ranking.

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::types::{
    Capability, ModelCatalogEntry, ModelTier, Operation, ScoringWeights, SelectionCriteria,
};

/// One ranked search hit. Transient; never stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredModel {
    pub entry: ModelCatalogEntry,
    pub score: f64,
    pub matched_required: Vec<Capability>,
    pub matched_optional: Vec<Capability>,
    /// Always empty for returned results; kept for diagnostics symmetry with
    /// [`RejectReason::MissingCapabilities`].
    pub missing_required: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingCapabilities { missing: Vec<Capability> },
    ProviderNotAllowed,
    ContextWindowTooSmall { required: u64, actual: u64 },
    MissingParameters { missing: Vec<String> },
    OperationUnavailable { operation: Operation },
}

/// Why a catalog entry was filtered out of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// `provider/id` of the rejected entry.
    pub model: String,
    #[serde(flatten)]
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchReport {
    pub results: Vec<ScoredModel>,
    pub rejected: Vec<Rejection>,
}

fn accuracy_factor(tier: Option<ModelTier>) -> f64 {
    match tier {
        Some(ModelTier::Flagship) => 1.0,
        // Experimental is neither ranked above nor below efficient.
        Some(ModelTier::Efficient) | Some(ModelTier::Experimental) => 0.7,
        Some(ModelTier::Legacy) => 0.4,
        None => 0.5,
    }
}

/// Speed guess for entries without throughput metrics.
fn tier_speed(tier: Option<ModelTier>) -> f64 {
    match tier {
        Some(ModelTier::Efficient) => 0.8,
        Some(ModelTier::Legacy) => 0.6,
        Some(ModelTier::Flagship) => 0.5,
        Some(ModelTier::Experimental) => 0.5,
        None => 0.5,
    }
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        1.0
    } else {
        (value - min) / (max - min)
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn reject(
    entry: &ModelCatalogEntry,
    criteria: &SelectionCriteria,
    available: &impl Fn(&ModelCatalogEntry, Operation) -> bool,
) -> Option<RejectReason> {
    let missing: Vec<Capability> = criteria
        .required
        .iter()
        .copied()
        .filter(|c| !entry.has(*c))
        .collect();
    if !missing.is_empty() {
        return Some(RejectReason::MissingCapabilities { missing });
    }
    if !criteria.providers.permits(&entry.provider) {
        return Some(RejectReason::ProviderNotAllowed);
    }
    if let Some(required) = criteria.min_context_window {
        if entry.context_window < required {
            return Some(RejectReason::ContextWindowTooSmall {
                required,
                actual: entry.context_window,
            });
        }
    }
    // An entry that declares no parameters is treated as unknown, not as
    // supporting none.
    if !entry.supported_parameters.is_empty() {
        let missing: Vec<String> = criteria
            .parameters
            .iter()
            .filter(|p| !entry.supported_parameters.contains(*p))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Some(RejectReason::MissingParameters { missing });
        }
    }
    if let Some(operation) = criteria.operation {
        if !available(entry, operation) {
            return Some(RejectReason::OperationUnavailable { operation });
        }
    }
    None
}

/// Filter and rank `entries`.
///
/// `available` reports whether an installed provider or handler can serve an
/// operation for an entry. Results are sorted by descending score; equal
/// scores are ordered by provider name, then model id.
pub fn search<'a>(
    entries: impl IntoIterator<Item = &'a ModelCatalogEntry>,
    criteria: &SelectionCriteria,
    weights: ScoringWeights,
    config: &CoreConfig,
    available: impl Fn(&ModelCatalogEntry, Operation) -> bool,
) -> SearchReport {
    let mut report = SearchReport::default();
    let mut candidates = Vec::new();
    for entry in entries {
        match reject(entry, criteria, &available) {
            Some(reason) => report.rejected.push(Rejection {
                model: entry.qualified_id(),
                reason,
            }),
            None => candidates.push(entry),
        }
    }

    let price = |e: &ModelCatalogEntry| {
        e.pricing
            .blended_per_million()
            .unwrap_or(config.default_cost_per_million_tokens)
    };
    let price_bounds = bounds(candidates.iter().map(|e| price(*e)));
    let speed_bounds = bounds(
        candidates
            .iter()
            .filter_map(|e| e.metrics.as_ref().and_then(|m| m.tokens_per_second)),
    );
    let max_context = candidates
        .iter()
        .map(|e| e.context_window)
        .max()
        .unwrap_or(0);

    report.results = candidates
        .into_iter()
        .map(|entry| {
            // Inverse-normalized: the cheapest candidate scores 1.0.
            let cost = match price_bounds {
                Some((lo, hi)) if (hi - lo).abs() >= f64::EPSILON => (hi - price(entry)) / (hi - lo),
                _ => 1.0,
            };
            let speed = match (
                entry.metrics.as_ref().and_then(|m| m.tokens_per_second),
                speed_bounds,
            ) {
                (Some(tps), Some((lo, hi))) => normalize(tps, lo, hi),
                _ => tier_speed(entry.tier),
            };
            let accuracy = accuracy_factor(entry.tier);
            let context = if max_context == 0 {
                0.0
            } else {
                entry.context_window as f64 / max_context as f64
            };

            let matched_optional: Vec<Capability> = criteria
                .optional
                .iter()
                .copied()
                .filter(|c| entry.has(*c))
                .collect();

            let mut score = weights.cost * cost
                + weights.speed * speed
                + weights.accuracy * accuracy
                + weights.context * context
                + config.optional_capability_bonus * matched_optional.len() as f64;
            if criteria.tier.is_some() && criteria.tier == entry.tier {
                score += config.tier_match_bonus;
            }

            ScoredModel {
                entry: entry.clone(),
                score,
                matched_required: criteria.required.clone(),
                matched_optional,
                missing_required: Vec::new(),
            }
        })
        .collect();

    report.results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.entry.provider.cmp(&b.entry.provider))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });
    report
}
