//! Spoken forms for common written abbreviations.
//!
//! Lookup is an exact match on the trimmed token, so "Dr." expands but
//! "Dr.," does not. No expansion is itself a key, which makes
//! normalization idempotent.

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Mr.", "Mister"),
    ("Mrs.", "Misses"),
    ("No.", "Number"),
    ("Dr.", "Doctor"),
    ("Ms.", "Miss"),
    ("Ave.", "Avenue"),
    ("Blvd.", "Boulevard"),
    ("Ln.", "Lane"),
    ("Rd.", "Road"),
    ("a.m.", "before noon"),
    ("p.m.", "after noon"),
    ("ft.", "feet"),
    ("hr.", "hour"),
    ("min.", "minute"),
    ("sq.", "square"),
    ("St.", "street"),
    ("Asst.", "assistant"),
    ("Corp.", "corporation"),
];

/// Spoken form of `token` if it is a known abbreviation.
pub fn expand(token: &str) -> Option<&'static str> {
    let token = token.trim();
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, spoken)| *spoken)
}

/// Replace a known abbreviation with its spoken form; anything else is returned trimmed.
pub fn normalize(token: &str) -> String {
    expand(token)
        .map(str::to_string)
        .unwrap_or_else(|| token.trim().to_string())
}
