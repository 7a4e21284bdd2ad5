//! Recommendation synthesis for consolidated items.
//!
//! Text is chosen from fixed templates keyed by the item's tag family,
//! severity, score quadrant and tool, so it is as deterministic as the
//! scores themselves.

use serde::{Deserialize, Serialize};

use crate::domain::finding::Finding;
use crate::domain::scored::ScoredItem;

/// Rendered advice for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Why the item matters.
    pub rationale: String,

    /// Value versus effort note.
    pub trade_off: String,

    /// Best-practice links (may be empty).
    pub references: Vec<String>,

    /// Ordered actionable steps.
    pub steps: Vec<String>,

    /// Markdown rendering of all of the above.
    pub text: String,
}

/// Coarse category a primary tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFamily {
    Security,
    Performance,
    Correctness,
    Tests,
    Style,
    Maintainability,
    UserFacing,
    General,
}

impl TagFamily {
    pub fn of(tag: Option<&str>) -> Self {
        match tag.unwrap_or_default() {
            "security" | "secrets" | "sast" | "vuln" => Self::Security,
            "perf" | "performance" | "reliability" => Self::Performance,
            "bug" | "correctness" => Self::Correctness,
            "tests" => Self::Tests,
            "style" | "lint" | "format" | "hygiene" | "dead-code" => Self::Style,
            "docs" | "typing" | "complexity" | "pattern" | "maintainability" => {
                Self::Maintainability
            }
            "ux" | "api" | "i18n" => Self::UserFacing,
            _ => Self::General,
        }
    }
}

/// Value/difficulty quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOff {
    QuickWin,
    MajorProject,
    NiceToHave,
    LowPriority,
    Balanced,
}

impl TradeOff {
    pub fn of(value: u8, difficulty: u8) -> Self {
        match (value, difficulty) {
            (v, d) if v >= 4 && d <= 2 => Self::QuickWin,
            (v, d) if v >= 4 && d >= 4 => Self::MajorProject,
            (v, d) if v <= 2 && d <= 2 => Self::NiceToHave,
            (v, d) if v <= 2 && d >= 4 => Self::LowPriority,
            _ => Self::Balanced,
        }
    }

    fn describe(&self, value: u8, difficulty: u8) -> String {
        match self {
            Self::QuickWin => format!(
                "High value, low effort (quick win): value {value}/5 at difficulty \
                 {difficulty}/5. Fix immediately."
            ),
            Self::MajorProject => format!(
                "High value, high effort (major project): value {value}/5 but difficulty \
                 {difficulty}/5. Plan dedicated time."
            ),
            Self::NiceToHave => format!(
                "Low value, low effort (nice to have): easy to fix ({difficulty}/5) with \
                 modest impact ({value}/5). Batch into cleanup work."
            ),
            Self::LowPriority => format!(
                "Low value, high effort (low priority): difficulty {difficulty}/5 for \
                 limited benefit ({value}/5). Consider deferring."
            ),
            Self::Balanced => format!(
                "Balanced: value {value}/5 and difficulty {difficulty}/5 are moderate. \
                 Schedule according to capacity."
            ),
        }
    }
}

fn rationale(family: TagFamily, finding: &Finding) -> String {
    let severity = finding.severity;
    match family {
        TagFamily::Security => format!(
            "Security issues can expose the application to attacks and data leaks. At \
             {severity} severity this is a potential vulnerability."
        ),
        TagFamily::Performance => format!(
            "Performance and reliability issues degrade user experience and raise \
             operating cost. This {severity} severity concern affects responsiveness or \
             stability."
        ),
        TagFamily::Correctness => format!(
            "Likely defect at {severity} severity. Incorrect behavior here can surface as \
             wrong results or crashes in production."
        ),
        TagFamily::Tests => "Test coverage gaps reduce confidence in changes and let \
             regressions through. Covering this code makes refactoring safer."
            .to_string(),
        TagFamily::Style => "Consistent style keeps code readable and reviews focused. \
             Lower priority than functional issues, but cheap to keep clean."
            .to_string(),
        TagFamily::Maintainability => format!(
            "Maintainability issue at {severity} severity. Clearer structure and types \
             lower the cost of future changes."
        ),
        TagFamily::UserFacing => format!(
            "User-facing issue at {severity} severity. It shapes how consumers of the \
             product or API experience it."
        ),
        TagFamily::General => format!(
            "This {severity} severity issue should be addressed to keep code quality up \
             and avoid problems in production."
        ),
    }
}

fn references(family: TagFamily, finding: &Finding) -> Vec<String> {
    let refs: &[&str] = match family {
        TagFamily::Security => &[
            "OWASP Top 10: https://owasp.org/www-project-top-ten/",
            "CWE Top 25: https://cwe.mitre.org/top25/",
        ],
        TagFamily::Performance => &["Web Vitals: https://web.dev/vitals/"],
        TagFamily::Tests => &[
            "Practical Test Pyramid: https://martinfowler.com/articles/practical-test-pyramid.html",
        ],
        TagFamily::Style if finding.file.ends_with(".py") => {
            &["PEP 8: https://peps.python.org/pep-0008/"]
        }
        _ => &[],
    };
    refs.iter().map(|s| s.to_string()).collect()
}

fn location(finding: &Finding) -> String {
    if finding.line == 0 {
        finding.file.clone()
    } else {
        format!("{}:{}", finding.file, finding.line)
    }
}

fn steps(finding: &Finding) -> Vec<String> {
    let at = location(finding);
    let rule = &finding.rule_id;
    let steps: Vec<String> = match finding.tool.as_str() {
        "flake8" => vec![
            format!("Review the violation at {at}"),
            "Apply automated fixes (black, autopep8) where applicable".to_string(),
            "Adjust the remaining code by hand".to_string(),
            "Re-run flake8 to confirm".to_string(),
        ],
        "bandit" => vec![
            format!("Review the security issue at {at}"),
            format!("Read the bandit documentation for {rule}"),
            "Replace the construct with a safe alternative".to_string(),
            "Add a regression test".to_string(),
            "Re-run bandit to confirm".to_string(),
        ],
        "semgrep" => vec![
            format!("Examine the pattern match at {at}"),
            format!("Review semgrep rule {rule}"),
            "Refactor away from the flagged pattern".to_string(),
            "Re-run semgrep to confirm".to_string(),
        ],
        "eslint" => vec![
            format!("Review the problem at {at}"),
            format!("Try `eslint --fix` for rule {rule}"),
            "Fix what the autofixer leaves".to_string(),
            "Re-run eslint to confirm".to_string(),
        ],
        _ => vec![
            format!("Locate the issue at {at}"),
            format!("Read the tool documentation for {rule}"),
            "Implement the recommended fix".to_string(),
            "Add tests covering the fix".to_string(),
            "Re-run static analysis to confirm".to_string(),
        ],
    };
    steps
}

/// Build the recommendation for `item` whose primary tag is `primary_tag`.
pub fn recommend(item: &ScoredItem, primary_tag: Option<&str>) -> Recommendation {
    let finding = &item.finding;
    let family = TagFamily::of(primary_tag);
    let rationale = rationale(family, finding);
    let trade_off = TradeOff::of(item.value, item.difficulty).describe(item.value, item.difficulty);
    let references = references(family, finding);
    let steps = steps(finding);

    let tags = if finding.tags.is_empty() {
        "none".to_string()
    } else {
        finding.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    let mut text = format!(
        "### [{}/5 value x {}/5 difficulty] {}\n\n",
        item.value,
        item.difficulty,
        location(finding)
    );
    text.push_str(&format!("**Issue**: `{}` from {}\n", finding.rule_id, finding.tool));
    text.push_str(&format!("**Message**: {}\n", finding.message));
    text.push_str(&format!(
        "**Severity**: {} | **Tags**: {}\n\n",
        finding.severity, tags
    ));
    text.push_str(&format!("**Rationale**: {rationale}\n\n"));
    text.push_str(&format!("**Trade-off**: {trade_off}\n\n"));
    if !references.is_empty() {
        text.push_str("**References**:\n");
        for r in &references {
            text.push_str(&format!("- {r}\n"));
        }
        text.push('\n');
    }
    text.push_str("**Steps**:\n");
    for (i, step) in steps.iter().enumerate() {
        text.push_str(&format!("{}. {step}\n", i + 1));
    }
    text.push_str(&format!("\n**Estimated effort**: ~{}h\n", item.estimated_hours));

    Recommendation {
        rationale,
        trade_off,
        references,
        steps,
        text,
    }
}
