//! eslint (JavaScript / TypeScript lint).

use crengine_core::{Finding, Language, Severity};
use serde_json::Value;

use super::{json_u32, parse_json_document, ParsedOutput, ToolSpec};

pub static SPEC: ToolSpec = ToolSpec {
    name: "eslint",
    languages: &[Language::Javascript, Language::Typescript],
    binary: "eslint",
    args: &["--format", "json", "--no-error-on-unmatched-pattern"],
    ok_exit_codes: &[0, 1],
    parse,
};

pub fn parse(stdout: &str) -> Result<ParsedOutput, String> {
    let mut parsed = ParsedOutput::default();
    let Some(doc) = parse_json_document(stdout)? else {
        return Ok(parsed);
    };
    let Value::Array(files) = doc else {
        return Err("expected a JSON array of file results".to_string());
    };

    for file in &files {
        let Some(path) = file.get("filePath").and_then(Value::as_str) else {
            parsed.malformed += 1;
            continue;
        };
        let Some(messages) = file.get("messages").and_then(Value::as_array) else {
            parsed.malformed += 1;
            continue;
        };
        for message in messages {
            match finding(path, message) {
                Some(f) => parsed.findings.push(f),
                None => parsed.malformed += 1,
            }
        }
    }
    Ok(parsed)
}

fn finding(path: &str, message: &Value) -> Option<Finding> {
    let text = message.get("message")?.as_str()?;
    let severity = match message.get("severity")?.as_u64()? {
        2 => Severity::Medium,
        1 => Severity::Low,
        _ => Severity::Info,
    };
    // Parse errors carry no rule id and `fatal: true`.
    let fatal = message.get("fatal").and_then(Value::as_bool).unwrap_or(false);
    let (rule, severity, tags) = match message.get("ruleId").and_then(Value::as_str) {
        Some(rule) => (rule, severity, vec!["lint"]),
        None if fatal => ("parse-error", Severity::High, vec!["lint", "correctness"]),
        None => ("eslint", severity, vec!["lint"]),
    };

    let line = json_u32(message.get("line")).unwrap_or(0);
    let mut f = Finding::new("eslint", path, line, rule, severity, text).with_tags(tags);
    if let Some(col) = json_u32(message.get("column")) {
        f = f.with_column(col);
    }
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_messages_per_file() {
        let out = r#"[
            {"filePath": "/repo/web/main.js", "messages": [
                {"ruleId": "no-unused-vars", "severity": 2, "message": "'x' is defined but never used", "line": 4, "column": 7},
                {"ruleId": "semi", "severity": 1, "message": "Missing semicolon.", "line": 9, "column": 12}
            ]},
            {"filePath": "/repo/web/broken.ts", "messages": [
                {"ruleId": null, "fatal": true, "severity": 2, "message": "Parsing error: Unexpected token", "line": 1, "column": 1}
            ]},
            {"filePath": "/repo/web/clean.js", "messages": []},
            {"messages": []}
        ]"#;
        let parsed = parse(out).unwrap();
        assert_eq!(parsed.findings.len(), 3);
        assert_eq!(parsed.malformed, 1);

        assert_eq!(parsed.findings[0].rule_id, "no-unused-vars");
        assert_eq!(parsed.findings[0].severity, Severity::Medium);
        assert_eq!(parsed.findings[1].severity, Severity::Low);
        assert_eq!(parsed.findings[2].rule_id, "parse-error");
        assert_eq!(parsed.findings[2].severity, Severity::High);
    }

    #[test]
    fn object_document_is_an_error() {
        assert!(parse(r#"{"results": []}"#).is_err());
    }
}
