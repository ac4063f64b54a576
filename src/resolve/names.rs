//! Name-based resolution: match company names in headline and body text
//! against the registry when no explicit ticker notation settled the record.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::explicit::Field;
use crate::config::ResolutionConfig;
use crate::data::{CleanedRecord, ResolutionReason};
use crate::registry::{normalize_name, tokenize, AliasKind, Registry};

const HEADLINE_WEIGHT: usize = 3;
const BODY_WEIGHT: usize = 1;
const HEADLINE_MATCH_CAP: usize = 3;
const BODY_MATCH_CAP: usize = 5;
const HEADLINE_BONUS: f64 = 0.05;
const MIN_EXACT_ALIAS_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MatchKind {
    Full,
    Short,
    Alias,
    Partial,
}

impl MatchKind {
    pub fn base_confidence(self) -> f64 {
        match self {
            MatchKind::Full => 0.90,
            MatchKind::Short => 0.80,
            MatchKind::Alias => 0.75,
            MatchKind::Partial => 0.50,
        }
    }
}

impl From<AliasKind> for MatchKind {
    fn from(kind: AliasKind) -> Self {
        match kind {
            AliasKind::Full => MatchKind::Full,
            AliasKind::Short => MatchKind::Short,
            AliasKind::Alias => MatchKind::Alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameMention {
    pub ticker: String,
    pub kind: MatchKind,
    pub field: Field,
    /// Normalized window that matched.
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamePrimary {
    pub ticker: String,
    pub confidence: f64,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameOutcome {
    pub mentions: Vec<NameMention>,
    pub primary: Option<NamePrimary>,
    pub reason: ResolutionReason,
}

impl NameOutcome {
    fn empty(reason: ResolutionReason) -> Self {
        Self {
            mentions: Vec::new(),
            primary: None,
            reason,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.primary.as_ref().map(|p| p.confidence).unwrap_or(0.0)
    }

    pub fn is_accepted(&self, threshold: f64) -> bool {
        self.primary
            .as_ref()
            .map(|p| p.confidence >= threshold)
            .unwrap_or(false)
    }
}

/// Headlines for live streams and video promos never describe a company event.
pub fn is_junk_headline(headline: &str) -> bool {
    let lower = headline.trim().to_lowercase();
    lower.starts_with("watch:") || lower.starts_with("live:") || lower.contains("news live")
}

/// One window that matched more than one registry entry.
#[derive(Debug)]
struct AmbiguousMention {
    tickers: BTreeSet<String>,
    matched: String,
}

#[derive(Debug, Default)]
struct Scan {
    exact: Vec<NameMention>,
    partial: Vec<NameMention>,
    ambiguous: Vec<AmbiguousMention>,
}

fn scan_field(text: &str, field: Field, registry: &Registry, config: &ResolutionConfig, scan: &mut Scan) {
    let tokens = tokenize(text);
    // Allow a couple of trailing suffix tokens beyond the longest alias.
    let max_n = config
        .name_max_ngram
        .min(registry.max_alias_tokens() + 2)
        .max(1);

    let mut i = 0;
    while i < tokens.len() {
        let mut consumed = 0;

        for n in (1..=max_n.min(tokens.len() - i)).rev() {
            let window = normalize_name(&tokens[i..i + n].join(" "));
            let window_len = window.chars().count();
            if window_len < MIN_EXACT_ALIAS_LEN {
                continue;
            }

            let hits = registry.alias_hits(&window);
            if let [hit] = hits.as_slice() {
                scan.exact.push(NameMention {
                    ticker: hit.entry.ticker.clone(),
                    kind: hit.kind.into(),
                    field,
                    matched: window,
                });
                consumed = n;
                break;
            }
            if hits.len() > 1 {
                scan.ambiguous.push(AmbiguousMention {
                    tickers: hits.iter().map(|h| h.entry.ticker.clone()).collect(),
                    matched: window,
                });
                consumed = n;
                break;
            }

            // Short partial names ("bank", "first") are too common to trust.
            if window_len < config.name_min_alias_len {
                continue;
            }
            if let [entry] = registry.lookup_prefix(&window).as_slice() {
                scan.partial.push(NameMention {
                    ticker: entry.ticker.clone(),
                    kind: MatchKind::Partial,
                    field,
                    matched: window,
                });
                consumed = n;
                break;
            }
        }

        i += consumed.max(1);
    }
}

#[derive(Debug)]
struct TickerTally {
    kind: MatchKind,
    headline: usize,
    body: usize,
}

impl TickerTally {
    fn weighted_score(&self) -> usize {
        self.headline.min(HEADLINE_MATCH_CAP) * HEADLINE_WEIGHT + self.body.min(BODY_MATCH_CAP) * BODY_WEIGHT
    }

    fn confidence(&self) -> f64 {
        let bonus = if self.headline > 0 { HEADLINE_BONUS } else { 0.0 };
        (self.kind.base_confidence() + bonus).min(1.0)
    }
}

fn tally(mentions: &[NameMention]) -> BTreeMap<String, TickerTally> {
    let mut tallies: BTreeMap<String, TickerTally> = BTreeMap::new();
    for mention in mentions {
        let entry = tallies.entry(mention.ticker.clone()).or_insert(TickerTally {
            kind: mention.kind,
            headline: 0,
            body: 0,
        });
        entry.kind = entry.kind.min(mention.kind);
        match mention.field {
            Field::Headline => entry.headline += 1,
            _ => entry.body += 1,
        }
    }
    tallies
}

/// Resolve a record by company-name mentions.
pub fn resolve(record: &CleanedRecord, registry: &Registry, config: &ResolutionConfig) -> NameOutcome {
    if is_junk_headline(&record.headline_clean) {
        return NameOutcome::empty(ResolutionReason::JunkHeadline);
    }

    let mut scan = Scan::default();
    scan_field(&record.headline_clean, Field::Headline, registry, config, &mut scan);
    scan_field(&record.text_clean, Field::Body, registry, config, &mut scan);

    if let Some(mention) = scan.ambiguous.first() {
        debug!(
            event_id = %record.event_id,
            name = %mention.matched,
            tickers = ?mention.tickers,
            "Ambiguous company name"
        );
        let mut outcome = NameOutcome::empty(ResolutionReason::Ambiguous);
        outcome.mentions = scan.exact;
        return outcome;
    }

    // Exact names outrank partial ones; partials only count on their own.
    let mentions = if scan.exact.is_empty() {
        scan.partial
    } else {
        scan.exact
    };
    if mentions.is_empty() {
        return NameOutcome::empty(ResolutionReason::NoMatch);
    }

    let tallies = tally(&mentions);
    let mut ranked: Vec<(&String, &TickerTally)> = tallies.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.weighted_score()
            .cmp(&a.1.weighted_score())
            .then(b.1.confidence().total_cmp(&a.1.confidence()))
    });

    let (primary, reason) = match ranked.as_slice() {
        [] => (None, ResolutionReason::NoMatch),
        [(ticker, only)] => (Some((*ticker, *only)), ResolutionReason::UniqueMatch),
        [(ticker, top), (_, runner_up), ..] => {
            if top.weighted_score() >= 2 * runner_up.weighted_score() {
                (Some((*ticker, *top)), ResolutionReason::DominantMatch)
            } else {
                (None, ResolutionReason::Ambiguous)
            }
        }
    };

    let primary = primary.map(|(ticker, tally)| NamePrimary {
        ticker: ticker.clone(),
        confidence: tally.confidence(),
        kind: tally.kind,
    });

    NameOutcome {
        mentions,
        primary,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING: &str = "\
ticker,company_full,company_short
EX,Example Corp,Example
OTH,Other Widgets Inc,Widgets
BAC,Bank of America Corporation,BofA
AMR,America Mining Ltd,America
DAL,Delta Air Lines Inc,Delta
DLTA,Delta Apparel Inc,Delta
EXW,Example Widgets International Ltd,
ABCT,Abc Technologies Inc,
";

    fn registry() -> Registry {
        Registry::from_reader(MAPPING.as_bytes()).unwrap()
    }

    fn record(headline: &str, text: &str) -> CleanedRecord {
        CleanedRecord {
            event_id: "evt-1".to_string(),
            timestamp: "2025-01-02T14:30:00Z".to_string(),
            source: "wire".to_string(),
            headline_clean: headline.to_string(),
            text_clean: text.to_string(),
            url: String::new(),
        }
    }

    fn resolve_text(headline: &str, text: &str) -> NameOutcome {
        resolve(&record(headline, text), &registry(), &ResolutionConfig::default())
    }

    #[test]
    fn test_full_name_in_body_is_accepted() {
        let outcome = resolve_text("", "Example Corp shares jumped today");
        let primary = outcome.primary.as_ref().unwrap();
        assert_eq!(primary.ticker, "EX");
        assert_eq!(primary.kind, MatchKind::Full);
        assert_eq!(outcome.reason, ResolutionReason::UniqueMatch);
        assert!(outcome.is_accepted(0.6));
    }

    #[test]
    fn test_headline_mention_adds_bonus() {
        let outcome = resolve_text("BofA raises dividend", "");
        let primary = outcome.primary.unwrap();
        assert_eq!(primary.ticker, "BAC");
        assert!((primary.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_longest_match_wins() {
        // "america" alone would be AMR; the longer bank name consumes it.
        let outcome = resolve_text("", "Bank of America reported earnings");
        assert_eq!(outcome.primary.unwrap().ticker, "BAC");
        assert_eq!(outcome.mentions.len(), 1);
    }

    #[test]
    fn test_two_companies_are_ambiguous() {
        let outcome = resolve_text("", "Example Corp and Other Widgets announced a merger");
        assert!(outcome.primary.is_none());
        assert_eq!(outcome.reason, ResolutionReason::Ambiguous);
    }

    #[test]
    fn test_dominant_company_wins() {
        let outcome = resolve_text(
            "Example Corp beats estimates",
            "Example said revenue grew while Widgets lagged",
        );
        // EX: headline 1 + body 1 = 4, OTH: body 1 = 1
        let primary = outcome.primary.unwrap();
        assert_eq!(primary.ticker, "EX");
        assert_eq!(outcome.reason, ResolutionReason::DominantMatch);
    }

    #[test]
    fn test_ambiguous_alias_rejects() {
        let outcome = resolve_text("Delta shares slide", "");
        assert!(outcome.primary.is_none());
        assert_eq!(outcome.reason, ResolutionReason::Ambiguous);
    }

    #[test]
    fn test_full_name_avoids_shared_alias() {
        let outcome = resolve_text("Delta Air Lines cuts guidance", "");
        let primary = outcome.primary.unwrap();
        assert_eq!(primary.ticker, "DAL");
        assert_eq!(primary.kind, MatchKind::Full);

        // A bare shared alias anywhere in the record still rejects it.
        let outcome = resolve_text("Delta Air Lines cuts guidance", "Delta said fuel costs rose");
        assert!(outcome.primary.is_none());
        assert_eq!(outcome.reason, ResolutionReason::Ambiguous);
    }

    #[test]
    fn test_partial_match_is_low_confidence() {
        let outcome = resolve_text("", "Example Widgets expands to Europe");
        // "example widgets" is a leading prefix of EXW's full name.
        let primary = outcome.primary.as_ref().unwrap();
        assert_eq!(primary.ticker, "EXW");
        assert_eq!(primary.kind, MatchKind::Partial);
        assert!(!outcome.is_accepted(0.6));
    }

    #[test]
    fn test_short_partial_is_discarded() {
        // "abc" prefixes ABCT's name but is under the minimum length.
        let outcome = resolve_text("", "the abc network said");
        assert!(outcome.primary.is_none());
        assert_eq!(outcome.reason, ResolutionReason::NoMatch);
    }

    #[test]
    fn test_junk_headline() {
        let outcome = resolve_text("WATCH: Example Corp CEO interview", "Example Corp");
        assert_eq!(outcome.reason, ResolutionReason::JunkHeadline);
        assert!(outcome.mentions.is_empty());
    }
}
