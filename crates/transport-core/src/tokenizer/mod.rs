//! TRANSPORT line tokenizer and normalizer.
//!
//! Lines are whitespace-delimited numeric cards terminated by an optional
//! `;`. Labels ride along in one of four delimiter styles and split type-12
//! entries span two physical lines. Everything here operates on owned field
//! strings so the record preparation stage never touches raw text again.

/// TRANSPORT writes at most this many values per physical line; type-12
/// cards overflow onto a continuation line.
pub const MAX_FIELDS_PER_LINE: usize = 15;

/// Window, in cards, searched either side of a dipole for a type-2
/// pole-face rotation.
pub const POLE_FACE_SEARCH_WINDOW: usize = 5;

const ILLEGAL_TOKENS: [&str; 4] = ["\"", "", "(", ")"];

/// Split a raw line into its non-empty fields, discarding everything after
/// the first `;` and dropping stray quote/parenthesis tokens.
pub fn tokenize(raw: &str) -> Vec<String> {
    let logical = match raw.find(';') {
        Some(end) => &raw[..end],
        None => raw,
    };
    logical
        .split_whitespace()
        .filter(|token| !ILLEGAL_TOKENS.contains(token))
        .map(str::to_string)
        .collect()
}

/// A comment line opens with `(` or `/`; only consulted after numeric
/// classification of the first field has failed.
pub fn is_comment(raw: &str) -> bool {
    matches!(raw.trim_start().chars().next(), Some('(') | Some('/'))
}

/// SENTINEL terminates the lattice definition; fitting directives follow it.
pub fn is_sentinel(fields: &[String]) -> bool {
    fields.iter().any(|field| field.starts_with("SENTINEL"))
}

/// Longest numeric-parseable prefix of the leading field. Fit-suffixed
/// codes (`5.0A`) parse to their numeric part; plain words parse to `None`.
pub fn type_code_value(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    for end in (1..=trimmed.len()).rev() {
        if !trimmed.is_char_boundary(end) {
            continue;
        }
        if let Ok(value) = trimmed[..end].parse::<f64>() {
            return Some(value);
        }
    }
    None
}

/// Element label: the first field carrying one of the delimiter pairs
/// `/…/`, `'…'`, `"…"` or `=…`; an unterminated pair runs to field end.
pub fn extract_label(fields: &[String]) -> Option<String> {
    for field in fields {
        for delimiter in ['/', '\'', '=', '"'] {
            if let Some(start) = field.find(delimiter) {
                let inner = &field[start + 1..];
                let label = match inner.find(delimiter) {
                    Some(end) => &inner[..end],
                    None => inner,
                };
                if label.is_empty() {
                    return None;
                }
                return Some(label.to_string());
            }
        }
    }
    None
}

/// Numeric payload of a card: every field after the type code that parses
/// as a float, in order. Labels and noise are skipped.
pub fn numeric_fields(fields: &[String]) -> Vec<f64> {
    fields
        .iter()
        .skip(1)
        .filter_map(|field| field.parse::<f64>().ok())
        .collect()
}

/// Join a split type-12 entry. The first physical line holds the type code
/// plus some of the up-to-15 values; exactly `15 - consumed` numeric fields
/// are taken from the continuation line, discarding non-numeric padding
/// (literal `000` artifacts have been observed). A single non-numeric field
/// on the first line is preserved as the label carrier.
pub fn join_split_lines(first: &[String], continuation: &[String]) -> Vec<String> {
    let mut numericals: Vec<String> = Vec::new();
    let mut non_numericals: Vec<String> = Vec::new();
    for field in first {
        if field.parse::<f64>().is_ok() {
            numericals.push(field.clone());
        } else {
            non_numericals.push(field.clone());
        }
    }

    // Values already consumed, excluding the type-code field itself.
    let consumed = numericals.len().saturating_sub(1);
    let wanted = MAX_FIELDS_PER_LINE.saturating_sub(consumed);

    let continuation_numericals: Vec<String> = continuation
        .iter()
        .filter_map(|field| field.parse::<f64>().ok().map(|value| format!("{value:.4}")))
        .collect();
    let take_from = continuation_numericals.len().saturating_sub(wanted);
    numericals.extend(continuation_numericals[take_from..].iter().cloned());

    if non_numericals.len() == 1 {
        numericals.push(non_numericals.remove(0));
    }
    numericals
}
