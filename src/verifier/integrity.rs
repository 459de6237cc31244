//! Integrity Checker: post-gate sanity checks over the
//! changed files, surfaced to the Verifier as synthetic gate results
//! (`integrity.policy`, `mutation.smoke`).

use once_cell::sync::Lazy;
use regex::RegexSet;

use super::GateResult;

/// Coverage and proof figures the Integrity Checker can't compute
/// itself; supplied by whatever upstream tooling produced them
/// (coverage report parser, test-framework proof artifact).
#[derive(Debug, Clone, Default)]
pub struct IntegrityInputs {
    pub changed_lines_coverage: f64,
    pub touched_files_delta_coverage: f64,
    pub failing_test_proof_declared: bool,
    pub failing_test_proof_provided: bool,
    pub mutation_smoke_passed: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct IntegrityConfig {
    pub coverage_target: f64,
    pub touched_files_delta_target: f64,
    pub mutation_smoke_enabled: bool,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            coverage_target: 0.05,
            touched_files_delta_target: 0.05,
            mutation_smoke_enabled: false,
        }
    }
}

static SUSPICIOUS_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)TODO-impl",
        r"(?i)#\[ignore\]",
        r"assert!\(true\)",
        r"(?i)\.skip\(",
        r"(?i)no-?op assertion",
    ])
    .expect("static pattern set compiles")
});

/// Result of one [`IntegrityChecker::check`] call.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub suspicious_files: Vec<String>,
    pub coverage_ok: bool,
    pub touched_coverage_ok: bool,
    pub proof_ok: bool,
    pub mutation_ok: Option<bool>,
    mutation_enabled: bool,
}

impl IntegrityReport {
    /// Synthetic `integrity.policy` gate, present whenever any policy
    /// check fails.
    pub fn policy_gate(&self) -> Option<GateResult> {
        if self.suspicious_files.is_empty() && self.coverage_ok && self.touched_coverage_ok && self.proof_ok {
            return None;
        }
        let mut reasons = Vec::new();
        if !self.suspicious_files.is_empty() {
            reasons.push(format!("suspicious patterns in: {}", self.suspicious_files.join(", ")));
        }
        if !self.coverage_ok {
            reasons.push("changed-lines coverage below target".to_string());
        }
        if !self.touched_coverage_ok {
            reasons.push("touched-files delta coverage below target".to_string());
        }
        if !self.proof_ok {
            reasons.push("declared failing-test proof was not provided".to_string());
        }
        Some(GateResult { gate: "integrity.policy".to_string(), success: false, output: reasons.join("; ") })
    }

    /// Synthetic `mutation.smoke` gate, present only when mutation smoke
    /// testing is enabled.
    pub fn mutation_gate(&self) -> Option<GateResult> {
        if !self.mutation_enabled {
            return None;
        }
        let success = self.mutation_ok.unwrap_or(false);
        Some(GateResult {
            gate: "mutation.smoke".to_string(),
            success,
            output: if success { String::new() } else { "mutation smoke run did not pass".to_string() },
        })
    }
}

pub struct IntegrityChecker {
    config: IntegrityConfig,
}

impl IntegrityChecker {
    pub fn new(config: IntegrityConfig) -> Self {
        Self { config }
    }

    /// Scan `changed_files` for suspicious patterns and combine with
    /// externally supplied coverage/proof figures.
    pub async fn check(&self, changed_files: &[String], inputs: &IntegrityInputs) -> IntegrityReport {
        let mut suspicious_files = Vec::new();
        for path in changed_files {
            if let Ok(contents) = tokio::fs::read_to_string(path).await {
                if SUSPICIOUS_PATTERNS.is_match(&contents) {
                    suspicious_files.push(path.clone());
                }
            }
        }

        IntegrityReport {
            suspicious_files,
            coverage_ok: inputs.changed_lines_coverage >= self.config.coverage_target,
            touched_coverage_ok: inputs.touched_files_delta_coverage >= self.config.touched_files_delta_target,
            proof_ok: !inputs.failing_test_proof_declared || inputs.failing_test_proof_provided,
            mutation_ok: inputs.mutation_smoke_passed,
            mutation_enabled: self.config.mutation_smoke_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn flags_suspicious_placeholder_pattern() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "// TODO-impl: finish this").unwrap();
        let checker = IntegrityChecker::new(IntegrityConfig::default());
        let inputs = IntegrityInputs { changed_lines_coverage: 1.0, touched_files_delta_coverage: 1.0, ..Default::default() };

        let report = checker.check(&[file.path().to_string_lossy().to_string()], &inputs).await;
        assert_eq!(report.suspicious_files.len(), 1);
        assert!(report.policy_gate().is_some());
    }

    #[tokio::test]
    async fn coverage_below_target_fails_policy_gate() {
        let checker = IntegrityChecker::new(IntegrityConfig::default());
        let inputs = IntegrityInputs { changed_lines_coverage: 0.01, touched_files_delta_coverage: 0.2, ..Default::default() };

        let report = checker.check(&[], &inputs).await;
        assert!(!report.coverage_ok);
        assert!(report.policy_gate().is_some());
    }

    #[tokio::test]
    async fn clean_inputs_produce_no_synthetic_gates() {
        let checker = IntegrityChecker::new(IntegrityConfig::default());
        let inputs = IntegrityInputs { changed_lines_coverage: 1.0, touched_files_delta_coverage: 1.0, ..Default::default() };

        let report = checker.check(&[], &inputs).await;
        assert!(report.policy_gate().is_none());
        assert!(report.mutation_gate().is_none());
    }

    #[tokio::test]
    async fn mutation_smoke_gate_present_only_when_enabled() {
        let mut config = IntegrityConfig::default();
        config.mutation_smoke_enabled = true;
        let checker = IntegrityChecker::new(config);
        let inputs = IntegrityInputs {
            changed_lines_coverage: 1.0,
            touched_files_delta_coverage: 1.0,
            mutation_smoke_passed: Some(false),
            ..Default::default()
        };

        let report = checker.check(&[], &inputs).await;
        let gate = report.mutation_gate().unwrap();
        assert!(!gate.success);
    }
}
