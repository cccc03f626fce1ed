//! Static analysis over subject code.
//!
//! A cheap regex rule pass run before the costlier LLM summary. Rules and
//! severities are deliberately simple; the pipeline only depends on the
//! [`Analyze`] seam, so richer engines can be swapped in.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum acceptable line length before a style finding is raised.
const MAX_LINE_LEN: usize = 120;

/// How much of an over-long line to keep in the snippet.
const SNIPPET_LEN: usize = 50;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Category of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    ConsoleLog,
    Todo,
    Security,
    Style,
}

/// One issue located in the analyzed code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Category of the issue.
    pub kind: FindingKind,
    /// Severity of the issue.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// 1-based line number.
    pub line: usize,
    /// Trimmed source line that triggered the rule.
    pub snippet: String,
}

/// Static analysis over a blob of code text.
pub trait Analyze: Send + Sync {
    /// Returns all findings in `code`, in line order.
    fn analyze(&self, code: &str) -> Vec<Finding>;
}

/// Regex-based code analyzer.
pub struct CodeAnalyzer {
    console_log: Regex,
    todo: Regex,
    hardcoded_password: Regex,
}

impl CodeAnalyzer {
    /// Creates an analyzer with the built-in rule set.
    pub fn new() -> Self {
        // The patterns are fixed at compile time, so construction cannot
        // fail at runtime.
        Self {
            console_log: Regex::new(r"console\.(log|debug|warn|error)")
                .expect("console pattern is valid"),
            todo: Regex::new(r"(?i)(TODO|FIXME|HACK|XXX)").expect("todo pattern is valid"),
            hardcoded_password: Regex::new(r#"(?i)(password|passwd|pwd)\s*=\s*["'][^"']+["']"#)
                .expect("password pattern is valid"),
        }
    }
}

impl Default for CodeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyze for CodeAnalyzer {
    fn analyze(&self, code: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if code.is_empty() {
            return findings;
        }

        for (idx, line) in code.lines().enumerate() {
            let line_num = idx + 1;

            if self.console_log.is_match(line) {
                findings.push(Finding {
                    kind: FindingKind::ConsoleLog,
                    severity: Severity::Low,
                    message: "Console log statement found".to_string(),
                    line: line_num,
                    snippet: line.trim().to_string(),
                });
            }

            if self.todo.is_match(line) {
                findings.push(Finding {
                    kind: FindingKind::Todo,
                    severity: Severity::Info,
                    message: "TODO/FIXME comment found".to_string(),
                    line: line_num,
                    snippet: line.trim().to_string(),
                });
            }

            if self.hardcoded_password.is_match(line) {
                findings.push(Finding {
                    kind: FindingKind::Security,
                    severity: Severity::High,
                    message: "Possible hardcoded password detected".to_string(),
                    line: line_num,
                    snippet: line.trim().to_string(),
                });
            }

            if line.len() > MAX_LINE_LEN {
                let cut: String = line.chars().take(SNIPPET_LEN).collect();
                findings.push(Finding {
                    kind: FindingKind::Style,
                    severity: Severity::Low,
                    message: format!("Line too long ({} characters)", line.len()),
                    line: line_num,
                    snippet: format!("{}...", cut.trim()),
                });
            }
        }

        tracing::debug!(count = findings.len(), "static analysis finished");
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_findings() {
        let analyzer = CodeAnalyzer::new();
        assert!(analyzer.analyze("").is_empty());
    }

    #[test]
    fn test_clean_code_yields_no_findings() {
        let analyzer = CodeAnalyzer::new();
        let code = "fn main() {\n    println!(\"hello\");\n}\n";
        assert!(analyzer.analyze(code).is_empty());
    }

    #[test]
    fn test_detects_console_log() {
        let analyzer = CodeAnalyzer::new();
        let findings = analyzer.analyze("console.log('debugging');\nconsole.warn('x');");

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, FindingKind::ConsoleLog);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].line, 1);
        assert_eq!(findings[1].line, 2);
    }

    #[test]
    fn test_detects_todo_markers_case_insensitive() {
        let analyzer = CodeAnalyzer::new();
        let findings = analyzer.analyze("// todo: clean this up\n// FIXME broken\n// hack");

        assert_eq!(findings.len(), 3);
        assert!(findings
            .iter()
            .all(|f| f.kind == FindingKind::Todo && f.severity == Severity::Info));
    }

    #[test]
    fn test_detects_hardcoded_password() {
        let analyzer = CodeAnalyzer::new();
        let findings = analyzer.analyze(r#"let password = "hunter2";"#);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Security);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].snippet.contains("hunter2"));
    }

    #[test]
    fn test_detects_long_line_with_truncated_snippet() {
        let analyzer = CodeAnalyzer::new();
        let long_line = "x".repeat(130);
        let findings = analyzer.analyze(&long_line);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Style);
        assert!(findings[0].message.contains("130"));
        assert!(findings[0].snippet.ends_with("..."));
        assert!(findings[0].snippet.len() <= SNIPPET_LEN + 3);
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let analyzer = CodeAnalyzer::new();
        let findings = analyzer.analyze("ok\nok\nconsole.log('third');");

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 3);
    }

    #[test]
    fn test_one_line_can_trigger_multiple_rules() {
        let analyzer = CodeAnalyzer::new();
        let findings = analyzer.analyze("console.log('x'); // TODO remove");

        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&FindingKind::ConsoleLog));
        assert!(kinds.contains(&FindingKind::Todo));
    }

    #[test]
    fn test_finding_serialization() {
        let finding = Finding {
            kind: FindingKind::Security,
            severity: Severity::High,
            message: "Possible hardcoded password detected".to_string(),
            line: 7,
            snippet: "pwd = \"secret\"".to_string(),
        };

        let json = serde_json::to_value(&finding).expect("should serialize");
        assert_eq!(json["kind"], "security");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["line"], 7);
    }
}
