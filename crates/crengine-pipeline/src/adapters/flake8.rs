//! flake8 (Python style and lint).
//!
//! Output is requested in a `::`-separated line format so messages
//! containing `:` survive intact.

use crengine_core::{Finding, Language, Severity};

use super::{ParsedOutput, ToolSpec};

pub static SPEC: ToolSpec = ToolSpec {
    name: "flake8",
    languages: &[Language::Python],
    binary: "flake8",
    args: &["--format=%(path)s::%(row)d::%(col)d::%(code)s::%(text)s"],
    ok_exit_codes: &[0, 1],
    parse,
};

/// Severity and tags for a flake8 code.
fn classify(code: &str) -> (Severity, &'static [&'static str]) {
    if code.starts_with("E9") {
        (Severity::Medium, &["lint", "correctness"])
    } else if code.starts_with("C9") {
        (Severity::Low, &["complexity"])
    } else if code.starts_with('F') {
        (Severity::Low, &["lint"])
    } else if code.starts_with('E') || code.starts_with('W') {
        (Severity::Info, &["style"])
    } else {
        (Severity::Info, &["lint"])
    }
}

pub fn parse(stdout: &str) -> Result<ParsedOutput, String> {
    let mut parsed = ParsedOutput::default();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.splitn(5, "::").collect();
        let [path, row, col, code, text] = parts[..] else {
            parsed.malformed += 1;
            continue;
        };
        let Ok(row) = row.trim().parse::<u32>() else {
            parsed.malformed += 1;
            continue;
        };
        let code = code.trim();
        if path.is_empty() || code.is_empty() {
            parsed.malformed += 1;
            continue;
        }

        let (severity, tags) = classify(code);
        let mut finding =
            Finding::new("flake8", path, row, code, severity, text.trim()).with_tags(tags.iter());
        if let Ok(col) = col.trim().parse::<u32>() {
            if col > 0 {
                finding = finding.with_column(col);
            }
        }
        parsed.findings.push(finding);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_classifies_codes() {
        let out = "\
./app.py::3::1::F401::'os' imported but unused
app.py::10::80::E501::line too long (88 > 79 characters)
app.py::12::1::E999::SyntaxError: invalid syntax
app.py::20::1::C901::'handler' is too complex (12)
";
        let parsed = parse(out).unwrap();
        assert_eq!(parsed.malformed, 0);
        assert_eq!(parsed.findings.len(), 4);

        let f401 = &parsed.findings[0];
        assert_eq!(f401.file, "./app.py");
        assert_eq!(f401.line, 3);
        assert_eq!(f401.column, Some(1));
        assert_eq!(f401.severity, Severity::Low);
        assert!(f401.has_tag("lint"));

        assert!(parsed.findings[1].has_tag("style"));
        assert_eq!(parsed.findings[1].severity, Severity::Info);
        assert_eq!(parsed.findings[2].severity, Severity::Medium);
        assert_eq!(parsed.findings[2].message, "SyntaxError: invalid syntax");
        assert!(parsed.findings[3].has_tag("complexity"));
    }

    #[test]
    fn skips_malformed_lines() {
        let out = "app.py::x::1::E1::bad row\nnot a record\napp.py::2::0::W291::trailing whitespace\n";
        let parsed = parse(out).unwrap();
        assert_eq!(parsed.malformed, 2);
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.findings[0].column, None);
    }
}
