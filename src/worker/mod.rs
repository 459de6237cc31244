//! Worker invocation: building the external worker's command lines and
//! parsing their combined output back into an [`ExecutionOutcome`].
//!
//! Grounded in this crate's `infrastructure/substrates/claude_code.rs`:
//! build a `tokio::process::Command` as its own process group leader, pipe
//! the prompt over stdin, and read stdout/stderr back. The caller
//! (`crate::pool::run_worker`) owns the wall-clock timeout and the
//! group-wide kill on expiry. The regex-driven failure/usage
//! classification in this module mirrors observed worker behaviour, not a
//! heuristic that's free to loosen.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::domain::{FailureKind, ReasoningLevel, UsageStats};

/// Build the architect worker's command line: `architect chat --message
/// <prompt>`, run from the workspace directory.
pub fn architect_command(prompt: &str, working_dir: &Path) -> Command {
    let mut cmd = Command::new("architect");
    cmd.current_dir(working_dir)
        .arg("chat")
        .arg("--message")
        .arg(prompt)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Build the engineer worker's command line: `engineer exec --full-auto
/// --sandbox <mode> [--model <m>] [--reasoning <level>] <prompt>`.
pub fn engineer_command(
    prompt: &str,
    sandbox_mode: &str,
    model: Option<&str>,
    reasoning: Option<ReasoningLevel>,
    working_dir: &Path,
) -> Command {
    let mut cmd = Command::new("engineer");
    cmd.current_dir(working_dir)
        .arg("exec")
        .arg("--full-auto")
        .arg("--sandbox")
        .arg(sandbox_mode);
    if let Some(model) = model {
        cmd.arg("--model").arg(model);
    }
    if let Some(level) = reasoning {
        cmd.arg("--reasoning").arg(level.as_str());
    }
    cmd.arg(prompt)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

static RATE_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rate limit|usage limit|too many requests").unwrap());

static CONTEXT_LIMIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)maximum context|context length|too long|input is too long").unwrap()
});

/// Classify a transient failure from a worker's combined stdout/stderr.
pub fn classify_failure(combined_output: &str) -> FailureKind {
    if RATE_LIMIT_RE.is_match(combined_output) {
        FailureKind::RateLimit
    } else if CONTEXT_LIMIT_RE.is_match(combined_output) {
        FailureKind::ContextLimit
    } else {
        FailureKind::Other
    }
}

static RETRY_AFTER_HM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)try again in (?:(\d+)\s*hours?)?\s*(?:(\d+)\s*minutes?)?").unwrap()
});
static RETRY_AFTER_SECS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry after (\d+)\s*seconds?").unwrap());

/// Parse a retry-after duration (in seconds) from worker output:
/// `"try again in H hours M minutes"` or `"retry after N seconds"`.
pub fn parse_retry_after(combined_output: &str) -> Option<i64> {
    if let Some(caps) = RETRY_AFTER_SECS_RE.captures(combined_output) {
        return caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok());
    }
    if let Some(caps) = RETRY_AFTER_HM_RE.captures(combined_output) {
        let hours: i64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        let minutes: i64 = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        if hours == 0 && minutes == 0 {
            return None;
        }
        return Some(hours * 3600 + minutes * 60);
    }
    None
}

static TOKENS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(prompt|completion|total|input|output)[ _-]?tokens?\s*(?:[:=]|is|used|were)\s*(\d+)")
        .unwrap()
});
static COST_USD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)cost(?: usd)?[^0-9]*(\d+\.\d+|\d+)").unwrap());
static COST_DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+\.\d+)").unwrap());

/// Extract optional token/cost usage from worker output.
pub fn parse_usage(combined_output: &str) -> Option<UsageStats> {
    let mut usage = UsageStats::default();
    let mut found_any = false;

    for caps in TOKENS_RE.captures_iter(combined_output) {
        let kind = caps[1].to_lowercase();
        let Ok(value) = caps[2].parse::<u64>() else {
            continue;
        };
        found_any = true;
        match kind.as_str() {
            "prompt" | "input" => usage.prompt_tokens = Some(value),
            "completion" | "output" => usage.completion_tokens = Some(value),
            "total" => usage.total_tokens = Some(value),
            _ => {}
        }
    }

    if usage.total_tokens.is_none() {
        if let (Some(p), Some(c)) = (usage.prompt_tokens, usage.completion_tokens) {
            usage.total_tokens = Some(p + c);
        }
    }

    if let Some(caps) = COST_USD_RE.captures(combined_output) {
        usage.cost_usd = caps[1].parse::<f64>().ok();
        found_any = found_any || usage.cost_usd.is_some();
    } else if let Some(caps) = COST_DOLLAR_RE.captures(combined_output) {
        usage.cost_usd = caps[1].parse::<f64>().ok();
        found_any = found_any || usage.cost_usd.is_some();
    }

    found_any.then_some(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_text() {
        assert_eq!(
            classify_failure("Error: too many requests, please slow down"),
            FailureKind::RateLimit
        );
    }

    #[test]
    fn classifies_context_limit_text() {
        assert_eq!(
            classify_failure("the input is too long for this model"),
            FailureKind::ContextLimit
        );
    }

    #[test]
    fn classifies_other_as_fallback() {
        assert_eq!(classify_failure("connection reset by peer"), FailureKind::Other);
    }

    #[test]
    fn parses_hours_and_minutes_retry_after() {
        let secs = parse_retry_after("please try again in 1 hour 15 minutes").unwrap();
        assert_eq!(secs, 4500);
    }

    #[test]
    fn parses_seconds_retry_after() {
        let secs = parse_retry_after("retry after 42 seconds").unwrap();
        assert_eq!(secs, 42);
    }

    #[test]
    fn missing_retry_after_is_none() {
        assert!(parse_retry_after("no timing information here").is_none());
    }

    #[test]
    fn parses_token_usage_and_synthesises_total() {
        let usage = parse_usage("input tokens: 120, output tokens used 80").unwrap();
        assert_eq!(usage.prompt_tokens, Some(120));
        assert_eq!(usage.completion_tokens, Some(80));
        assert_eq!(usage.total_tokens, Some(200));
    }

    #[test]
    fn parses_cost_from_dollar_sign() {
        let usage = parse_usage("this run cost $1.23 total").unwrap();
        assert_eq!(usage.cost_usd, Some(1.23));
    }

    #[test]
    fn parses_cost_from_cost_usd_phrase() {
        let usage = parse_usage("cost usd 0.45").unwrap();
        assert_eq!(usage.cost_usd, Some(0.45));
    }

    #[test]
    fn no_usage_signals_returns_none() {
        assert!(parse_usage("just a plain response with no metrics").is_none());
    }
}
