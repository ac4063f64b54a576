//! Name normalization shared by registry construction and text scanning.
//! Both sides must go through these functions or recall silently drops.

const CORPORATE_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "limited",
    "llc",
    "plc",
    "lp",
    "sa",
    "ag",
    "nv",
    "group",
    "holdings",
];

/// Lowercase, drop apostrophes and periods, turn other punctuation into
/// spaces, and collapse whitespace. No suffix handling.
fn fold_chars(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\'' | '\u{2019}' | '.' => {}
            c if c.is_alphanumeric() => folded.extend(c.to_lowercase()),
            _ => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form of a company name or text window.
///
/// Trailing corporate suffixes are stripped repeatedly ("Foo Holdings Inc"
/// becomes "foo") but the last token is always kept, so the function is
/// idempotent.
pub fn normalize_name(input: &str) -> String {
    let folded = fold_chars(input);
    let mut tokens: Vec<&str> = folded.split(' ').filter(|t| !t.is_empty()).collect();
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if CORPORATE_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }
    tokens.join(" ")
}

/// Split text into folded tokens suitable for building n-gram windows.
pub fn tokenize(text: &str) -> Vec<String> {
    fold_chars(text).split_whitespace().map(str::to_string).collect()
}
