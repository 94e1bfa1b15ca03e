//! Line-oriented parsing of clang-tidy build logs.
//!
//! A diagnostic begins at any line shaped `<file>:<line>:<col>: <severity>:
//! <message>` (Windows drive letters tolerated); every following line up to
//! the next header joins its raw-lines buffer. Parsing never aborts on a
//! malformed line, it just moves on.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;

use super::{Diagnostic, NinjaSection, Severity};

#[allow(clippy::unwrap_used)]
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| re(r"\x1b\[[0-9;]*[A-Za-z]"));

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"^((?:[A-Za-z]:)?[^:]+):(\d+):(\d+): (warning|error): (.*)$"));

static CHECK_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"^(.*?)\s*\[([A-Za-z0-9][A-Za-z0-9.,_-]*)\]$"));

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| re(r"^\[(\d+)/(\d+)\]\s+(.*)$"));

/// Remove ANSI escape sequences for pattern matching. Raw lines keep them.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(line, "")
}

/// Split the ordered log lines into ninja sections. Lines before the first
/// progress header form a preamble section with `done == total == 0`.
pub fn split_sections(lines: &[String]) -> Vec<NinjaSection> {
    let mut sections: Vec<NinjaSection> = Vec::new();
    let mut current = NinjaSection {
        done: 0,
        total: 0,
        description: String::new(),
        lines: Vec::new(),
    };
    let mut saw_header = false;

    for line in lines {
        let stripped = strip_ansi(line);
        if let Some(caps) = SECTION_RE.captures(&stripped) {
            if saw_header || !current.lines.is_empty() {
                sections.push(current);
            }
            saw_header = true;
            current = NinjaSection {
                done: caps[1].parse().unwrap_or(0),
                total: caps[2].parse().unwrap_or(0),
                description: caps[3].to_string(),
                lines: Vec::new(),
            };
        } else {
            current.lines.push(line.clone());
        }
    }
    if saw_header || !current.lines.is_empty() {
        sections.push(current);
    }
    sections
}

/// Parse diagnostics out of ordered log lines.
pub fn parse_diagnostics(lines: &[String]) -> Vec<Diagnostic> {
    let mut diags: Vec<Diagnostic> = Vec::new();

    for line in lines {
        let stripped = strip_ansi(line);
        if let Some(caps) = HEADER_RE.captures(&stripped) {
            let severity = match &caps[4] {
                "error" => Severity::Error,
                _ => Severity::Warning,
            };
            let full_message = caps[5].trim_end();
            let (message, check) = match CHECK_RE.captures(full_message) {
                Some(check_caps) => (check_caps[1].to_string(), check_caps[2].to_string()),
                None => (
                    full_message.to_string(),
                    format!("clang-diagnostic-{}", severity.as_str()),
                ),
            };
            diags.push(Diagnostic {
                file: caps[1].to_string(),
                line: caps[2].parse().unwrap_or(0),
                col: caps[3].parse().unwrap_or(0),
                severity,
                check,
                message,
                raw_lines: vec![line.clone()],
            });
        } else if let Some(current) = diags.last_mut() {
            current.raw_lines.push(line.clone());
        }
    }

    diags
}
