//! Explicit symbol extraction: cashtags, exchange-qualified symbols and
//! quote-page URLs. Precision-first; anything unclear is left to the name
//! resolver rather than guessed.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::config::ResolutionConfig;
use crate::data::{CleanedRecord, ResolutionReason};

lazy_static! {
    static ref CASHTAG: Regex = Regex::new(r"\$([A-Z]{1,5})\b")
        .expect("Failed to compile CASHTAG regex - this is a bug in the hardcoded pattern");

    static ref EXCHANGE_PREFIX: Regex = Regex::new(
        r"(?:\(|\b)(?i:NASDAQ|NYSE|AMEX|OTC|TSX|LSE)\s*:\s?([A-Z]{1,5})(?:\)|\b)"
    ).expect("Failed to compile EXCHANGE_PREFIX regex - this is a bug in the hardcoded pattern");

    static ref QUOTE_URL: Regex = Regex::new(
        r"(?i)(?:finance\.yahoo\.com/quote/|google\.com/finance/quote/|marketwatch\.com/investing/stock/)([A-Z]{1,5})\b"
    ).expect("Failed to compile QUOTE_URL regex - this is a bug in the hardcoded pattern");
}

/// Ticker notation recognised in text, ordered by how little ambiguity it
/// carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Notation {
    QuoteUrl,
    Cashtag,
    ExchangePrefix,
}

impl Notation {
    pub fn base_confidence(self) -> f64 {
        match self {
            Notation::QuoteUrl => 0.95,
            Notation::Cashtag => 0.90,
            Notation::ExchangePrefix => 0.85,
        }
    }

    pub fn reason(self) -> ResolutionReason {
        match self {
            Notation::QuoteUrl => ResolutionReason::QuoteUrl,
            Notation::Cashtag => ResolutionReason::Cashtag,
            Notation::ExchangePrefix => ResolutionReason::ExchangePrefix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Headline,
    Body,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub field: Field,
    pub range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplicitCandidate {
    pub ticker: String,
    pub confidence: f64,
    pub notation: Notation,
    pub span: Span,
}

/// The single ticker the extractor is prepared to stand behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplicitPrimary {
    pub ticker: String,
    pub confidence: f64,
    pub notation: Notation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplicitOutcome {
    /// Every raw match, in scan order.
    pub candidates: Vec<ExplicitCandidate>,
    pub primary: Option<ExplicitPrimary>,
    pub ambiguous: bool,
}

impl ExplicitOutcome {
    /// Confidence of the chosen ticker; 0 when nothing was chosen.
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

/// Upper-case words that follow an exchange name in prose but are not symbols.
const STOPLIST: &[&str] = &[
    "THE", "AND", "FOR", "WITH", "THIS", "FROM", "THAT", "HAVE", "WILL", "YOUR", "YOU", "ARE",
    "WAS", "HAS", "NEW", "NEWS", "POST", "LINK", "URL", "HTTP", "HTTPS", "WWW", "EDIT", "NYSE",
    "NASDAQ", "AMEX", "OTC", "TSX", "LSE", "AI", "FDA", "DOJ", "TODAY", "SEC", "IRS", "CDC",
    "WHO", "NATO",
];

fn usable_symbol(symbol: &str, notation: Notation) -> bool {
    symbol.len() > 1
        && !symbol.contains('^')
        && !symbol.contains('=')
        && !(notation == Notation::ExchangePrefix && STOPLIST.contains(&symbol))
}

fn scan_field(text: &str, field: Field, out: &mut Vec<ExplicitCandidate>) {
    let patterns: [(&Regex, Notation); 3] = [
        (&QUOTE_URL, Notation::QuoteUrl),
        (&CASHTAG, Notation::Cashtag),
        (&EXCHANGE_PREFIX, Notation::ExchangePrefix),
    ];

    for (pattern, notation) in patterns {
        for caps in pattern.captures_iter(text) {
            let Some(symbol) = caps.get(1) else { continue };
            let ticker = symbol.as_str().to_uppercase();
            if !usable_symbol(&ticker, notation) {
                continue;
            }
            out.push(ExplicitCandidate {
                ticker,
                confidence: notation.base_confidence(),
                notation,
                span: Span {
                    field,
                    range: symbol.range(),
                },
            });
        }
    }
}

/// Per-ticker aggregate: confidences are combined by max, never summed.
#[derive(Debug)]
struct TickerSummary {
    confidence: f64,
    notation: Notation,
    in_headline: bool,
}

/// Scan a record for explicit ticker notations and decide whether a single
/// primary ticker stands out.
pub fn extract(record: &CleanedRecord, config: &ResolutionConfig) -> ExplicitOutcome {
    let mut candidates = Vec::new();
    scan_field(&record.headline_clean, Field::Headline, &mut candidates);
    scan_field(&record.text_clean, Field::Body, &mut candidates);
    scan_field(&record.url, Field::Url, &mut candidates);

    let mut summaries: BTreeMap<&str, TickerSummary> = BTreeMap::new();
    for candidate in &candidates {
        let summary = summaries
            .entry(candidate.ticker.as_str())
            .or_insert(TickerSummary {
                confidence: 0.0,
                notation: candidate.notation,
                in_headline: false,
            });
        if candidate.confidence > summary.confidence
            || (candidate.confidence == summary.confidence && candidate.notation < summary.notation)
        {
            summary.confidence = candidate.confidence;
            summary.notation = candidate.notation;
        }
        summary.in_headline |= candidate.span.field == Field::Headline;
    }

    let (primary, ambiguous) = select_primary(&summaries, config);

    ExplicitOutcome {
        candidates,
        primary,
        ambiguous,
    }
}

fn select_primary(
    summaries: &BTreeMap<&str, TickerSummary>,
    config: &ResolutionConfig,
) -> (Option<ExplicitPrimary>, bool) {
    if summaries.len() > config.explicit_max_candidates {
        return (None, true);
    }

    // Stable sort over ticker-ordered input keeps ties deterministic.
    let mut ranked: Vec<(&str, &TickerSummary)> = summaries.iter().map(|(t, s)| (*t, s)).collect();
    ranked.sort_by(|a, b| {
        b.1.in_headline
            .cmp(&a.1.in_headline)
            .then(b.1.confidence.total_cmp(&a.1.confidence))
    });

    let to_primary = |ticker: &str, s: &TickerSummary| ExplicitPrimary {
        ticker: ticker.to_string(),
        confidence: s.confidence,
        notation: s.notation,
    };

    match ranked.as_slice() {
        [] => (None, false),
        [(ticker, only)] => (Some(to_primary(*ticker, *only)), false),
        [(top_ticker, top), (_, runner_up), ..] => {
            let headline_precedence = top.in_headline && !runner_up.in_headline;
            let confidence_precedence =
                top.confidence - runner_up.confidence >= config.explicit_precedence_margin;

            if headline_precedence || confidence_precedence {
                (Some(to_primary(*top_ticker, *top)), false)
            } else {
                (None, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(headline: &str, text: &str, url: &str) -> CleanedRecord {
        CleanedRecord {
            event_id: "evt-1".to_string(),
            timestamp: "2025-01-02T14:30:00Z".to_string(),
            source: "wire".to_string(),
            headline_clean: headline.to_string(),
            text_clean: text.to_string(),
            url: url.to_string(),
        }
    }

    fn config() -> ResolutionConfig {
        ResolutionConfig::default()
    }

    #[test]
    fn test_cashtag_is_accepted() {
        let outcome = extract(&record("$EX surged", "", ""), &config());
        let primary = outcome.primary.as_ref().unwrap();
        assert_eq!(primary.ticker, "EX");
        assert_eq!(primary.notation, Notation::Cashtag);
        assert!(outcome.is_accepted(0.85));
        assert_eq!(outcome.candidates[0].span.range, 1..3);
    }

    #[test]
    fn test_exchange_prefix_variants() {
        let outcome = extract(&record("", "Shares of Example (NYSE: EX) rose", ""), &config());
        assert_eq!(outcome.primary.unwrap().notation, Notation::ExchangePrefix);

        let outcome = extract(&record("", "listed on nasdaq:ABCD today", ""), &config());
        assert_eq!(outcome.primary.unwrap().ticker, "ABCD");
    }

    #[test]
    fn test_prose_after_exchange_name_is_not_a_symbol() {
        let outcome = extract(&record("Nasdaq: Apple shares rise", "", ""), &config());
        assert!(outcome.candidates.is_empty());
        assert!(outcome.primary.is_none());

        let outcome = extract(
            &record("", "Stocks closed mixed on the NYSE: the index fell", ""),
            &config(),
        );
        assert!(outcome.candidates.is_empty());

        let outcome = extract(&record("", "Traders on the NYSE: THE open was quiet", ""), &config());
        assert!(outcome.candidates.is_empty());

        let outcome = extract(&record("", "nasdaq:abcd listed today", ""), &config());
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn test_quote_url_has_highest_confidence() {
        let outcome = extract(
            &record("", "", "https://finance.yahoo.com/quote/EXM/news"),
            &config(),
        );
        let primary = outcome.primary.unwrap();
        assert_eq!(primary.ticker, "EXM");
        assert_eq!(primary.confidence, 0.95);
    }

    #[test]
    fn test_repetition_does_not_inflate_confidence() {
        let outcome = extract(&record("$EX $EX", "$EX again, NYSE:EX", ""), &config());
        assert_eq!(outcome.candidates.len(), 4);
        assert_eq!(outcome.confidence(), 0.90);
    }

    #[test]
    fn test_single_letter_and_lowercase_cashtags_are_ignored() {
        let outcome = extract(&record("$F rallies", "costs $ex", ""), &config());
        assert!(outcome.primary.is_none());
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn test_two_body_cashtags_are_ambiguous() {
        let outcome = extract(&record("Markets rally", "$EX and $OTH both rose", ""), &config());
        assert!(outcome.ambiguous);
        assert_eq!(outcome.confidence(), 0.0);
        assert!(!outcome.is_accepted(0.85));
    }

    #[test]
    fn test_headline_mention_takes_precedence() {
        let outcome = extract(&record("$EX beats estimates", "peer $OTH lagged", ""), &config());
        assert!(!outcome.ambiguous);
        assert_eq!(outcome.primary.unwrap().ticker, "EX");
    }

    #[test]
    fn test_quote_url_outranks_body_exchange_prefix() {
        let outcome = extract(
            &record("", "Rival OTH (NYSE: OTH) fell", "https://finance.yahoo.com/quote/EX"),
            &config(),
        );
        assert_eq!(outcome.primary.unwrap().ticker, "EX");
    }

    #[test]
    fn test_too_many_candidates_is_ambiguous() {
        let outcome = extract(
            &record("$AA $BB $CC $DD $EE $FF movers", "", ""),
            &config(),
        );
        assert!(outcome.ambiguous);
        assert!(outcome.primary.is_none());
    }
}
