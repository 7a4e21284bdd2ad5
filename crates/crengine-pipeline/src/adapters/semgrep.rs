//! semgrep (multi-language pattern rules).

use crengine_core::{Finding, Language, Severity};
use serde_json::Value;

use super::{json_u32, parse_json_document, ParsedOutput, ToolSpec};

pub static SPEC: ToolSpec = ToolSpec {
    name: "semgrep",
    languages: &[
        Language::Python,
        Language::Javascript,
        Language::Typescript,
        Language::Go,
        Language::Java,
        Language::Ruby,
        Language::Php,
        Language::CSharp,
        Language::Kotlin,
        Language::C,
        Language::Cpp,
        Language::Rust,
        Language::Swift,
        Language::Shell,
    ],
    binary: "semgrep",
    args: &["scan", "--json", "--quiet", "--disable-version-check", "--config", "auto"],
    ok_exit_codes: &[0, 1],
    parse,
};

fn severity(label: &str) -> Severity {
    match label.to_ascii_uppercase().as_str() {
        "ERROR" => Severity::High,
        "WARNING" => Severity::Medium,
        "INFO" => Severity::Low,
        other => Severity::from_label(other),
    }
}

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
    let check_id = result.get("check_id")?.as_str()?;
    let path = result.get("path")?.as_str()?;
    let start = result.get("start")?;
    let line = json_u32(start.get("line"))?;
    let extra = result.get("extra");

    let severity = extra
        .and_then(|e| e.get("severity"))
        .and_then(Value::as_str)
        .map(severity)
        .unwrap_or(Severity::Low);
    let message = extra
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut tags: Vec<String> = vec!["pattern".to_string()];
    if let Some(category) = extra
        .and_then(|e| e.get("metadata"))
        .and_then(|m| m.get("category"))
        .and_then(Value::as_str)
    {
        tags.push(category.to_string());
    }
    if check_id.contains("security") {
        tags.push("security".to_string());
    }

    let mut f = Finding::new("semgrep", path, line, check_id, severity, message).with_tags(tags);
    if let Some(col) = json_u32(start.get("col")) {
        f = f.with_column(col);
    }
    if let Some(fix) = extra.and_then(|e| e.get("fix")).and_then(Value::as_str) {
        f = f.with_suggestion(fix);
    }
    Some(f)
}
