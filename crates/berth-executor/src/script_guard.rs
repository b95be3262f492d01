//! Script validation for `evaluate` and `waitForFunction`.
//!
//! A fixed, case-insensitive deny set rejects DOM-injection and
//! infinite-loop primitives outright; a warn set flags storage and
//! prototype access without blocking. This is containment for rented
//! contexts, not a sandbox.

use berth_types::{Error, Result, SCRIPT_WARN_LEN};
use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    pattern: Regex,
    label: &'static str,
}

fn rule(pattern: &str, label: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(&format!("(?i){pattern}")).expect("script guard pattern"),
        label,
    }
}

static DENY: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\beval\s*\(", "eval call"),
        rule(r"new\s+Function\s*\(", "Function constructor"),
        rule(r"\.\s*(inner|outer)HTML\s*=", "innerHTML/outerHTML assignment"),
        rule(r"document\s*\.\s*write(ln)?\s*\(", "document.write"),
        rule(r"document\s*\.\s*cookie", "document.cookie access"),
        rule(r"window\s*\.\s*location\s*=", "window.location assignment"),
        rule(r"<\s*script", "script tag fragment"),
        rule(r"\.\s*(append|remove|replace)Child\s*\(", "DOM child mutation"),
        rule(r"javascript\s*:", "javascript: url"),
        rule(r"<\s*iframe", "iframe fragment"),
        rule(r"\bon\w+\s*=", "inline event handler"),
        rule(r"while\s*\(\s*(true|1)\s*\)", "unbounded while loop"),
        rule(r"for\s*\(\s*;\s*;\s*\)", "unbounded for loop"),
    ]
});

static WARN: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\blocalStorage\b", "localStorage access"),
        rule(r"\bsessionStorage\b", "sessionStorage access"),
        rule(r"\bfetch\s*\(", "fetch call"),
        rule(r"__proto__", "__proto__ access"),
        rule(r"\bconstructor\b", "constructor access"),
    ]
});

#[derive(Default)]
pub struct ScriptGuard;

impl ScriptGuard {
    pub fn new() -> Self {
        Self
    }

    /// Reject denied patterns; return warnings for flagged ones.
    pub fn check(&self, script: &str) -> Result<Vec<String>> {
        for rule in DENY.iter() {
            if rule.pattern.is_match(script) {
                return Err(Error::blocked(format!("script rejected: {}", rule.label)));
            }
        }
        let mut warnings: Vec<String> = WARN
            .iter()
            .filter(|rule| rule.pattern.is_match(script))
            .map(|rule| format!("script warning: {}", rule.label))
            .collect();
        if script.len() > SCRIPT_WARN_LEN {
            warnings.push(format!(
                "script length {} exceeds {SCRIPT_WARN_LEN} chars",
                script.len()
            ));
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_types::ErrorKind;

    fn check(script: &str) -> Result<Vec<String>> {
        ScriptGuard::new().check(script)
    }

    #[test]
    fn benign_scripts_pass_clean() {
        assert!(check("1 + 2 + 3").unwrap().is_empty());
        assert!(check("document.title").unwrap().is_empty());
        assert!(check("Array.from(document.querySelectorAll('a')).length")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn deny_set_rejects() {
        for script in [
            "eval('1')",
            "new Function('return 1')()",
            "el.innerHTML = '<b>x</b>'",
            "document.write('<p>')",
            "document.writeln('x')",
            "document.cookie",
            "window.location = 'https://evil.example'",
            "x = '<script>alert(1)</script>'",
            "parent.appendChild(node)",
            "node.removeChild(child)",
            "a.replaceChild(b, c)",
            "location.href = 'javascript:void(0)'",
            "frame = '<iframe src=x>'",
            "div.outerHTML = y",
            "s = '<img onerror=alert(1)>'",
            "while (true) {}",
            "while(1){}",
            "for (;;) {}",
            "EVAL('upper case')",
        ] {
            let err = check(script).unwrap_err();
            assert_eq!(
                err.kind(),
                ErrorKind::BlockedByPolicy,
                "{script} should be rejected"
            );
        }
    }

    #[test]
    fn warn_set_warns_without_blocking() {
        let warnings = check("localStorage.getItem('k')").unwrap();
        assert_eq!(warnings.len(), 1);

        let warnings = check("fetch('/api').then(r => r.json())").unwrap();
        assert_eq!(warnings.len(), 1);

        let warnings = check("obj.__proto__").unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn long_scripts_warn() {
        let script = format!("let x = 0; {}", " x += 1;".repeat(2000));
        assert!(script.len() > SCRIPT_WARN_LEN);
        let warnings = check(&script).unwrap();
        assert!(warnings.iter().any(|w| w.contains("length")));
    }
}
