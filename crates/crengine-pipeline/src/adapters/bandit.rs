//! bandit (Python security).

use crengine_core::{Finding, Language, Severity};
use serde_json::Value;

use super::{json_u32, parse_json_document, ParsedOutput, ToolSpec};

pub static SPEC: ToolSpec = ToolSpec {
    name: "bandit",
    languages: &[Language::Python],
    binary: "bandit",
    args: &["-f", "json", "-q"],
    ok_exit_codes: &[0, 1],
    parse,
};

/// Hardcoded password checks.
const SECRET_TESTS: &[&str] = &["B105", "B106", "B107"];

pub fn parse(stdout: &str) -> Result<ParsedOutput, String> {
    let mut parsed = ParsedOutput::default();
    let Some(doc) = parse_json_document(stdout)? else {
        return Ok(parsed);
    };
    let results = match doc.get("results") {
        Some(Value::Array(results)) => results,
        Some(_) => return Err("`results` is not an array".to_string()),
        None => return Ok(parsed),
    };

    for result in results {
        match finding(result) {
            Some(f) => parsed.findings.push(f),
            None => parsed.malformed += 1,
        }
    }
    Ok(parsed)
}

fn finding(result: &Value) -> Option<Finding> {
    let test_id = result.get("test_id")?.as_str()?;
    let file = result.get("filename")?.as_str()?;
    let line = json_u32(result.get("line_number"))?;
    let severity = result
        .get("issue_severity")
        .and_then(Value::as_str)
        .map(Severity::from_label)
        .unwrap_or(Severity::Low);
    let message = result
        .get("issue_text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut tags = vec!["security", "sast"];
    if SECRET_TESTS.contains(&test_id) {
        tags.push("secrets");
    }

    let mut f = Finding::new("bandit", file, line, test_id, severity, message).with_tags(tags);
    if let Some(col) = json_u32(result.get("col_offset")) {
        f = f.with_column(col.saturating_add(1));
    }
    if let Some(more) = result.get("more_info").and_then(Value::as_str) {
        f = f.with_suggestion(format!("See {more}"));
    }
    Some(f)
}
