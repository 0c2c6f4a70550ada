//! Name normalization and fuzzy similarity for the resolution cascade.

use std::sync::OnceLock;

use regex::Regex;

use crate::util::normalize_text;

/// Strip parenthetical tags like "(Host)" that platforms append to names.
fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)\s*").expect("valid regex"))
}

/// Strip trailing "- Zoom …" style device suffixes.
fn device_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*-\s*zoom.*$").expect("valid regex"))
}

/// Normalize a person name for cascade comparison: strip platform noise,
/// case-fold, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let stripped = parenthetical_re().replace_all(name, " ");
    let stripped = device_suffix_re().replace_all(&stripped, "");
    normalize_text(&stripped)
}

/// Normalize an email for tier-1 equality: lowercase, trim.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fuzzy similarity in [0, 1]: the ratio of characters covered by matching
/// blocks over the combined length (2·M / (|a| + |b|)). Longest matching
/// block first, then recurse on the unmatched flanks.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut matched = 0usize;
    let mut stack = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = stack.pop() {
        let (i, j, k) = longest_matching_block(&a[alo..ahi], &b[blo..bhi]);
        if k == 0 {
            continue;
        }
        matched += k;
        stack.push((alo, alo + i, blo, blo + j));
        stack.push((alo + i + k, ahi, blo + j + k, bhi));
    }

    2.0 * matched as f64 / (a.len() + b.len()) as f64
}

/// Longest common contiguous block between two char slices, as
/// (start_in_a, start_in_b, length). Earliest block wins ties.
fn longest_matching_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = length of the common suffix ending at (i, j)
    let mut lengths = vec![0usize; b.len() + 1];

    for i in 0..a.len() {
        // Walk j backwards so lengths[j - 1] still holds the previous row.
        for j in (0..b.len()).rev() {
            if a[i] == b[j] {
                let run = lengths[j] + 1;
                lengths[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            } else {
                lengths[j + 1] = 0;
            }
        }
        lengths[0] = 0;
    }

    best
}
