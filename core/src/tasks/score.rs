//! Task priority scoring. Lower scores sort first and mean "easier".
//!
//! `score = max(check_weight) * file_factor + 0.05 * diagnostic_count`

use std::path::Path;

use crate::pathkey;

/// Weight table, most specific entry first. Prefix matching, with the
/// identifier-naming check pinned ahead of the generic `readability-` tier.
const CHECK_WEIGHTS: &[(&str, f64)] = &[
    ("readability-identifier-naming", 1.0),
    ("modernize-", 2.0),
    ("readability-", 3.0),
    ("performance-", 5.0),
    ("llvm-", 5.0),
    ("google-", 5.0),
    ("cppcoreguidelines-", 8.0),
    ("bugprone-", 10.0),
];

const UNKNOWN_WEIGHT: f64 = 5.0;

pub fn check_weight(check: &str) -> f64 {
    for (prefix, weight) in CHECK_WEIGHTS {
        if check.starts_with(prefix) {
            return *weight;
        }
    }
    UNKNOWN_WEIGHT
}

/// Headers weigh double: a header finding fans out into every includer.
pub fn file_factor(file: &Path) -> f64 {
    if pathkey::is_header(file) { 2.0 } else { 1.0 }
}

pub fn task_score<'a>(
    checks: impl Iterator<Item = &'a str>,
    file: &Path,
    diagnostic_count: usize,
) -> f64 {
    let max_weight = checks.map(check_weight).fold(0.0_f64, f64::max);
    max_weight * file_factor(file) + 0.05 * diagnostic_count as f64
}
