//! Compiler results log.
//!
//! Every pass that can find drift between an asset and its parent writes
//! here instead of failing. The severity counts decide the final status.

use serde::{Deserialize, Serialize};

/// Severity of a compiler message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// A single logged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerMessage {
    pub severity: Severity,
    pub text: String,
    /// Node the message refers to, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// Accumulated notes, warnings and errors for one compile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerResultsLog {
    pub messages: Vec<CompilerMessage>,
    pub num_errors: usize,
    pub num_warnings: usize,
    /// Report warnings and errors at info level (used when loading)
    #[serde(default)]
    pub log_info_only: bool,
}

impl CompilerResultsLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that downgrades its tracing output to info
    pub fn info_only() -> Self {
        Self {
            log_info_only: true,
            ..Self::default()
        }
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.push(Severity::Note, text.into(), None);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(Severity::Warning, text.into(), None);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(Severity::Error, text.into(), None);
    }

    /// Log a message attached to a node
    pub fn node_message(&mut self, severity: Severity, node: &str, text: impl Into<String>) {
        self.push(severity, text.into(), Some(node.to_string()));
    }

    fn push(&mut self, severity: Severity, text: String, node: Option<String>) {
        match severity {
            Severity::Note => {
                tracing::debug!(target: "blueprint", "{}", text);
            }
            Severity::Warning => {
                self.num_warnings += 1;
                if self.log_info_only {
                    tracing::info!(target: "blueprint", "warning: {}", text);
                } else {
                    tracing::warn!(target: "blueprint", "{}", text);
                }
            }
            Severity::Error => {
                self.num_errors += 1;
                if self.log_info_only {
                    tracing::info!(target: "blueprint", "error: {}", text);
                } else {
                    tracing::error!(target: "blueprint", "{}", text);
                }
            }
        }
        self.messages.push(CompilerMessage {
            severity,
            text,
            node,
        });
    }

    /// Move every message from another log into this one
    pub fn append(&mut self, other: CompilerResultsLog) {
        self.num_errors += other.num_errors;
        self.num_warnings += other.num_warnings;
        self.messages.extend(other.messages);
    }

    pub fn has_errors(&self) -> bool {
        self.num_errors > 0
    }

    /// Messages of one severity
    pub fn of_severity(&self, severity: Severity) -> impl Iterator<Item = &CompilerMessage> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    pub fn num_notes(&self) -> usize {
        self.of_severity(Severity::Note).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut log = CompilerResultsLog::new();
        log.note("rebound");
        log.warning("converted");
        log.error("missing");
        log.node_message(Severity::Warning, "n1", "again");

        assert_eq!(log.num_notes(), 1);
        assert_eq!(log.num_warnings, 2);
        assert_eq!(log.num_errors, 1);
        assert!(log.has_errors());
        assert_eq!(log.messages[3].node.as_deref(), Some("n1"));
    }

    #[test]
    fn test_append() {
        let mut a = CompilerResultsLog::new();
        a.warning("one");
        let mut b = CompilerResultsLog::info_only();
        b.error("two");

        a.append(b);
        assert_eq!(a.num_warnings, 1);
        assert_eq!(a.num_errors, 1);
        assert_eq!(a.messages.len(), 2);
    }
}
