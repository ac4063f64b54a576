//! Combine explicit and name-based outcomes into one resolution result.

use super::explicit::ExplicitOutcome;
use super::names::NameOutcome;
use crate::config::ResolutionConfig;
use crate::data::{ResolutionReason, ResolutionResult, ResolutionSource};

/// Pure merge of precomputed stage outputs. An accepted explicit ticker wins
/// outright and any name output is ignored.
pub fn merge(
    event_id: &str,
    explicit: &ExplicitOutcome,
    name: Option<&NameOutcome>,
    config: &ResolutionConfig,
) -> ResolutionResult {
    if let Some(primary) = explicit
        .primary
        .as_ref()
        .filter(|p| p.confidence >= config.explicit_accept_threshold)
    {
        return ResolutionResult::accepted(
            event_id,
            primary.ticker.clone(),
            primary.confidence,
            ResolutionSource::Explicit,
            primary.notation.reason(),
        );
    }

    if let Some(name) = name {
        if let Some(primary) = name
            .primary
            .as_ref()
            .filter(|p| p.confidence >= config.name_accept_threshold)
        {
            return ResolutionResult::accepted(
                event_id,
                primary.ticker.clone(),
                primary.confidence,
                ResolutionSource::NameMatch,
                name.reason,
            );
        }
    }

    ResolutionResult::rejected(event_id, rejection_reason(explicit, name))
}

fn rejection_reason(explicit: &ExplicitOutcome, name: Option<&NameOutcome>) -> ResolutionReason {
    match name {
        Some(name) if name.primary.is_some() => ResolutionReason::LowConfidence,
        Some(name) if name.reason == ResolutionReason::NoMatch && explicit.ambiguous => {
            ResolutionReason::Ambiguous
        }
        Some(name) => name.reason,
        None if explicit.ambiguous => ResolutionReason::Ambiguous,
        None if explicit.primary.is_some() => ResolutionReason::LowConfidence,
        None => ResolutionReason::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::explicit::{ExplicitPrimary, Notation};
    use crate::resolve::names::{MatchKind, NamePrimary};

    fn explicit(ticker: Option<(&str, f64)>, ambiguous: bool) -> ExplicitOutcome {
        ExplicitOutcome {
            candidates: Vec::new(),
            primary: ticker.map(|(t, c)| ExplicitPrimary {
                ticker: t.to_string(),
                confidence: c,
                notation: Notation::Cashtag,
            }),
            ambiguous,
        }
    }

    fn named(ticker: Option<(&str, f64)>, reason: ResolutionReason) -> NameOutcome {
        NameOutcome {
            mentions: Vec::new(),
            primary: ticker.map(|(t, c)| NamePrimary {
                ticker: t.to_string(),
                confidence: c,
                kind: MatchKind::Full,
            }),
            reason,
        }
    }

    #[test]
    fn test_explicit_wins_over_name() {
        let config = ResolutionConfig::default();
        let name = named(Some(("OTH", 0.95)), ResolutionReason::UniqueMatch);
        let result = merge("e1", &explicit(Some(("EX", 0.90)), false), Some(&name), &config);
        assert_eq!(result.ticker.as_deref(), Some("EX"));
        assert_eq!(result.resolution_source, ResolutionSource::Explicit);
        assert_eq!(result.reason, ResolutionReason::Cashtag);
    }

    #[test]
    fn test_name_match_when_explicit_missing() {
        let config = ResolutionConfig::default();
        let name = named(Some(("EX", 0.90)), ResolutionReason::UniqueMatch);
        let result = merge("e1", &explicit(None, false), Some(&name), &config);
        assert!(result.is_accepted());
        assert_eq!(result.resolution_source, ResolutionSource::NameMatch);
        assert_eq!(result.ticker_confidence, 0.90);
    }

    #[test]
    fn test_low_confidence_name_is_rejected() {
        let config = ResolutionConfig::default();
        let name = named(Some(("EX", 0.50)), ResolutionReason::UniqueMatch);
        let result = merge("e1", &explicit(None, false), Some(&name), &config);
        assert!(!result.is_accepted());
        assert_eq!(result.ticker, None);
        assert_eq!(result.reason, ResolutionReason::LowConfidence);
    }

    #[test]
    fn test_ambiguous_explicit_with_no_name_match() {
        let config = ResolutionConfig::default();
        let name = named(None, ResolutionReason::NoMatch);
        let result = merge("e1", &explicit(None, true), Some(&name), &config);
        assert_eq!(result.reason, ResolutionReason::Ambiguous);
        assert_eq!(result.resolution_source, ResolutionSource::None);
    }

    #[test]
    fn test_merge_is_pure() {
        let config = ResolutionConfig::default();
        let e = explicit(None, false);
        let n = named(Some(("EX", 0.80)), ResolutionReason::DominantMatch);
        let first = merge("e1", &e, Some(&n), &config);
        let second = merge("e1", &e, Some(&n), &config);
        assert_eq!(first, second);
    }
}
