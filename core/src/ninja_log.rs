//! Per-step timing statistics from `.ninja_log`.
//!
//! The v5 format is tab-separated `start end mtime output cmdhash` with `#`
//! header lines. Only outputs named `tidy_(check|fix)_step_N` count; missing
//! or malformed lines are skipped.

use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;

#[allow(clippy::unwrap_used)]
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static TIDY_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"tidy_(check|fix)_step_\d+"));

#[derive(Debug, Clone, PartialEq)]
pub struct StepTiming {
    pub name: String,
    pub millis: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TidyStepStats {
    pub count: usize,
    pub total_ms: u64,
    pub mean_ms: u64,
    pub p95_ms: u64,
    /// Top five slowest steps, slowest first.
    pub slowest: Vec<StepTiming>,
}

impl TidyStepStats {
    pub fn render(&self) -> String {
        let mut out = format!(
            "tidy steps: {} | wall {:.1}s | mean {}ms | p95 {}ms\n",
            self.count,
            self.total_ms as f64 / 1000.0,
            self.mean_ms,
            self.p95_ms
        );
        for step in &self.slowest {
            out.push_str(&format!("  {:>8}ms  {}\n", step.millis, step.name));
        }
        out
    }
}

/// Parse the log; `None` when the file cannot be read or holds no tidy steps.
pub fn parse_ninja_log(path: &Path) -> Option<TidyStepStats> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut timings: Vec<StepTiming> = Vec::new();

    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[3];
        if !TIDY_STEP_RE.is_match(name) {
            continue;
        }
        let (Ok(start), Ok(end)) = (fields[0].parse::<u64>(), fields[1].parse::<u64>()) else {
            continue;
        };
        if end < start {
            continue;
        }
        timings.push(StepTiming {
            name: name.to_string(),
            millis: end - start,
        });
    }

    if timings.is_empty() {
        return None;
    }

    let count = timings.len();
    let total_ms: u64 = timings.iter().map(|t| t.millis).sum();
    let mut sorted: Vec<u64> = timings.iter().map(|t| t.millis).collect();
    sorted.sort_unstable();
    let p95_index = ((count as f64 * 0.95).ceil() as usize).clamp(1, count) - 1;
    let p95_ms = sorted[p95_index];

    let mut slowest = timings;
    slowest.sort_by(|a, b| b.millis.cmp(&a.millis));
    slowest.truncate(5);

    Some(TidyStepStats {
        count,
        total_ms,
        mean_ms: total_ms / count as u64,
        p95_ms,
        slowest,
    })
}
