//! Patch prompt construction: source context plus a template chosen by the
//! finding's tags.

use std::fmt::Write as _;
use std::path::Path;

use crengine_core::Finding;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are an expert software engineer fixing issues reported by \
static analysis tools. Propose the smallest change that resolves the issue without altering \
unrelated behavior. Answer with a unified diff in a single ```diff fenced block, followed by \
at most three sentences explaining the change.";

/// Lines around a finding, read from the working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub target_line: String,
    pub before: Vec<String>,
    pub after: Vec<String>,

    /// Numbered excerpt with `→` marking the target line, or a note
    /// explaining why no excerpt is available.
    pub rendered: String,
}

impl SourceContext {
    fn unavailable(note: String) -> Self {
        Self {
            rendered: note,
            ..Self::default()
        }
    }
}

/// Read `context_lines` lines either side of `line` (1-based) from `path`.
///
/// File-level findings (`line = 0`) use the first line.
pub fn extract_context(path: &Path, line: u32, context_lines: usize) -> SourceContext {
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return SourceContext::unavailable(format!("File not found: {}", path.display()))
        }
        Err(e) => return SourceContext::unavailable(format!("Error reading file: {e}")),
    };
    let lines: Vec<&str> = content.lines().collect();
    let target = line.max(1) as usize - 1;
    if target >= lines.len() {
        return SourceContext::unavailable(format!(
            "Line {} out of range (file has {} lines)",
            line.max(1),
            lines.len()
        ));
    }

    let start = target.saturating_sub(context_lines);
    let end = (target + context_lines + 1).min(lines.len());
    let mut rendered = String::new();
    for (i, text) in lines.iter().enumerate().take(end).skip(start) {
        let marker = if i == target { '→' } else { ' ' };
        let _ = writeln!(rendered, "{:4}{marker} {text}", i + 1);
    }

    SourceContext {
        target_line: lines[target].to_string(),
        before: lines[start..target].iter().map(|s| s.to_string()).collect(),
        after: lines[target + 1..end].iter().map(|s| s.to_string()).collect(),
        rendered: rendered.trim_end().to_string(),
    }
}

/// Prompt family selected from a finding's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    Security,
    Performance,
    General,
}

impl PromptTemplate {
    pub fn for_finding(finding: &Finding) -> Self {
        if finding.has_any_tag(&["security", "secrets", "sast"]) {
            Self::Security
        } else if finding.has_any_tag(&["perf", "performance"]) {
            Self::Performance
        } else {
            Self::General
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::Security => {
                "This is a security issue. Remove the vulnerability at its root: validate or \
                 escape untrusted input, avoid shell interpolation, and never hard-code \
                 credentials (read them from configuration or the environment instead)."
            }
            Self::Performance => {
                "This is a performance issue. Reduce the algorithmic or allocation cost while \
                 keeping the observable behavior identical."
            }
            Self::General => "Fix the reported issue following the project's existing style.",
        }
    }

    /// Render the user prompt for `finding` with its source context.
    pub fn render(&self, finding: &Finding, context: &SourceContext) -> String {
        let line = match finding.line {
            0 => "N/A".to_string(),
            n => n.to_string(),
        };
        format!(
            "{instructions}\n\n\
             Tool: {tool}\n\
             Rule: {rule}\n\
             Severity: {severity}\n\
             File: {file}\n\
             Line: {line}\n\
             Issue: {message}\n\n\
             Context:\n```\n{context}\n```\n",
            instructions = self.instructions(),
            tool = finding.tool,
            rule = finding.rule_id,
            severity = finding.severity,
            file = finding.file,
            message = finding.message,
            context = context.rendered,
        )
    }
}
