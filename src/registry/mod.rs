//! Company registry: ticker <-> company name aliases
//! Loaded once per run from a CSV mapping and shared read-only by every resolver worker

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::data::validation::validate_symbol;
use crate::errors::RegistryLoadError;

pub mod normalize;

pub use normalize::{normalize_name, tokenize};

const REQUIRED_COLUMNS: [&str; 3] = ["ticker", "company_full", "company_short"];

/// Where an alias came from. Ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AliasKind {
    Full,
    Short,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub ticker: String,
    pub company_full: String,
    pub company_short: String,
    /// Normalized aliases, including the normalized full and short names.
    pub aliases: BTreeSet<String>,
}

/// A registry hit for one normalized alias.
#[derive(Debug, Clone, Copy)]
pub struct AliasHit<'a> {
    pub entry: &'a RegistryEntry,
    pub kind: AliasKind,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    by_ticker: HashMap<String, usize>,
    alias_index: HashMap<String, Vec<(usize, AliasKind)>>,
    prefix_index: HashMap<String, Vec<usize>>,
    max_alias_tokens: usize,
}

#[derive(Default)]
struct EntryBuilder {
    company_full: String,
    company_short: String,
    aliases: BTreeMap<String, AliasKind>,
}

impl EntryBuilder {
    fn add_alias(&mut self, raw: &str, kind: AliasKind) {
        let normalized = normalize_name(raw);
        if normalized.is_empty() {
            return;
        }
        self.aliases
            .entry(normalized)
            .and_modify(|existing| *existing = (*existing).min(kind))
            .or_insert(kind);
    }
}

fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Registry {
    /// Load the registry from a CSV file on disk.
    pub fn load(path: &Path) -> Result<Self, RegistryLoadError> {
        let file = std::fs::File::open(path)?;
        let registry = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            entries = registry.len(),
            aliases = registry.alias_index.len(),
            "Company registry loaded"
        );
        Ok(registry)
    }

    /// Build the registry from CSV with a `ticker,company_full,company_short`
    /// header. Extra columns named `aliases` (split on `|` or `;`) or starting
    /// with `alias_` contribute additional names.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RegistryLoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RegistryLoadError::MissingColumns(missing));
        }

        let column = |name: &str| headers.iter().position(|h| h == name);
        let ticker_col = column("ticker").unwrap_or_default();
        let full_col = column("company_full").unwrap_or_default();
        let short_col = column("company_short").unwrap_or_default();
        let alias_cols: Vec<(usize, bool)> = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| {
                if h == "aliases" {
                    Some((idx, true))
                } else if h.starts_with("alias_") {
                    Some((idx, false))
                } else {
                    None
                }
            })
            .collect();

        let mut builders: BTreeMap<String, EntryBuilder> = BTreeMap::new();

        for row in csv_reader.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            let field = |idx: usize| row.get(idx).unwrap_or("");

            let ticker = field(ticker_col).trim().to_uppercase();
            if ticker.is_empty() {
                return Err(RegistryLoadError::BlankTicker { line });
            }
            if validate_symbol(&ticker).is_err() {
                return Err(RegistryLoadError::InvalidTicker { line, ticker });
            }

            let company_full = clean_name(field(full_col));
            let company_short = clean_name(field(short_col));
            if company_full.is_empty() && company_short.is_empty() {
                return Err(RegistryLoadError::MissingName { line, ticker });
            }

            let builder = builders.entry(ticker.clone()).or_default();

            if !company_full.is_empty() {
                if builder.company_full.is_empty() {
                    builder.company_full = company_full.clone();
                } else if normalize_name(&builder.company_full) != normalize_name(&company_full) {
                    return Err(RegistryLoadError::ConflictingEntry {
                        line,
                        ticker,
                        existing: builder.company_full.clone(),
                        incoming: company_full,
                    });
                }
                builder.add_alias(&company_full, AliasKind::Full);
            }

            if !company_short.is_empty() {
                if builder.company_short.is_empty() {
                    builder.company_short = company_short.clone();
                    builder.add_alias(&company_short, AliasKind::Short);
                } else {
                    builder.add_alias(&company_short, AliasKind::Alias);
                }
            }

            for &(idx, multi) in &alias_cols {
                let value = field(idx);
                if multi {
                    for alias in value.split(['|', ';']) {
                        builder.add_alias(alias, AliasKind::Alias);
                    }
                } else {
                    builder.add_alias(value, AliasKind::Alias);
                }
            }
        }

        if builders.is_empty() {
            return Err(RegistryLoadError::Empty);
        }

        Ok(Self::from_builders(builders))
    }

    fn from_builders(builders: BTreeMap<String, EntryBuilder>) -> Self {
        let mut registry = Registry::default();

        for (idx, (ticker, builder)) in builders.into_iter().enumerate() {
            for (alias, kind) in &builder.aliases {
                registry
                    .alias_index
                    .entry(alias.clone())
                    .or_default()
                    .push((idx, *kind));

                let tokens: Vec<&str> = alias.split(' ').collect();
                registry.max_alias_tokens = registry.max_alias_tokens.max(tokens.len());
                for k in 1..tokens.len() {
                    let prefix = normalize_name(&tokens[..k].join(" "));
                    if prefix.is_empty() || builder.aliases.contains_key(&prefix) {
                        continue;
                    }
                    let slot = registry.prefix_index.entry(prefix).or_default();
                    if !slot.contains(&idx) {
                        slot.push(idx);
                    }
                }
            }

            debug!(ticker = %ticker, aliases = builder.aliases.len(), "Registered ticker");
            registry.by_ticker.insert(ticker.clone(), idx);
            registry.entries.push(RegistryEntry {
                ticker,
                company_full: builder.company_full,
                company_short: builder.company_short,
                aliases: builder.aliases.into_keys().collect(),
            });
        }

        registry
    }

    /// Entries whose alias set contains `normalized`, in ticker order.
    /// More than one entry means the name is ambiguous.
    pub fn lookup_by_alias(&self, normalized: &str) -> Vec<&RegistryEntry> {
        self.alias_hits(normalized).into_iter().map(|hit| hit.entry).collect()
    }

    /// Like [`Registry::lookup_by_alias`] but also reports the alias kind.
    pub fn alias_hits(&self, normalized: &str) -> Vec<AliasHit<'_>> {
        self.alias_index
            .get(normalized)
            .map(|hits| {
                hits.iter()
                    .map(|&(idx, kind)| AliasHit {
                        entry: &self.entries[idx],
                        kind,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entries for which `normalized` is a strict leading-token prefix of a
    /// longer alias, e.g. "example widgets" for "Example Widgets Holdings Ltd".
    pub fn lookup_prefix(&self, normalized: &str) -> Vec<&RegistryEntry> {
        self.prefix_index
            .get(normalized)
            .map(|idxs| idxs.iter().map(|&idx| &self.entries[idx]).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, ticker: &str) -> Option<&RegistryEntry> {
        self.by_ticker.get(ticker).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Longest alias in tokens; windows longer than this never match.
    pub fn max_alias_tokens(&self) -> usize {
        self.max_alias_tokens
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
