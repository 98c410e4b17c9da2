//! HTML scraping helpers for the panel login flow.
//!
//! Everything here is a pure function over a response body so the upstream
//! markup can drift without touching the session or retry logic.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_DOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!doctype\s+html|<html").expect("html regex is valid"));

static CAPTCHA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"What is\s+(\d+)\s*\+\s*(\d+)\s*=").expect("captcha regex is valid")
});

/// Solve the login page's arithmetic captcha ("What is 6 + 3 = ?").
///
/// Returns `None` when the prompt is missing, which usually means the page
/// layout changed or we were served a block page instead of the login form.
pub fn solve_captcha(html: &str) -> Option<u64> {
    let caps = CAPTCHA_RE.captures(html)?;
    let a: u64 = caps[1].parse().ok()?;
    let b: u64 = caps[2].parse().ok()?;
    a.checked_add(b)
}

/// Run `patterns` in order against `html` and return the first non-empty
/// capture group 1.
pub fn extract_token(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// A query endpoint answering with an HTML document instead of JSON has
/// bounced us to the login page. The whole body is searched: panels may emit
/// PHP notices ahead of the page.
pub fn looks_like_html(body: &str) -> bool {
    HTML_DOC_RE.is_match(body)
}

/// Detect a firewall or application-level denial on the login page.
pub fn is_blocked(status: u16, body: &str, markers: &[String]) -> bool {
    status == 403 || markers.iter().any(|m| !m.is_empty() && body.contains(m.as_str()))
}

/// Strip tags and surrounding whitespace from a small HTML fragment.
pub fn bare_text(fragment: &str) -> String {
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));
    TAG_RE.replace_all(fragment, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn test_solve_captcha_single_digit() {
        let html = r#"<label>What is 7 + 4 = ?</label><input name="capt">"#;
        assert_eq!(solve_captcha(html), Some(11));
    }

    #[test]
    fn test_solve_captcha_multi_digit() {
        assert_eq!(solve_captcha("What is 12 + 34 = ?"), Some(46));
        assert_eq!(solve_captcha("What is 3 + 5 ="), Some(8));
    }

    #[test]
    fn test_solve_captcha_missing() {
        assert_eq!(solve_captcha("<h1>403 Forbidden</h1>"), None);
        assert_eq!(solve_captcha("What is A + B = ?"), None);
    }

    #[test]
    fn test_extract_token_primary() {
        let html = r#"<script>var u = "res/data_smscdr.php?csstr=ABC123&x=1";</script>"#;
        let patterns = [re(r#"csstr=([^"&']+)"#)];
        assert_eq!(extract_token(html, &patterns).as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_extract_token_fallback() {
        let html = r#"data: { 'csstr' : 'XyZ9==' }"#;
        let patterns = [
            re(r#"csstr=([^"&']+)"#),
            re(r#"["']csstr["']\s*[:=]\s*["']([^"']+)["']"#),
        ];
        assert_eq!(extract_token(html, &patterns).as_deref(), Some("XyZ9=="));
    }

    #[test]
    fn test_extract_token_sesskey() {
        let html = "ajax: 'res/data_smscdr.php?sesskey=Q1w%3D&fdate1='";
        let patterns = [re(r"sesskey=([a-zA-Z0-9%=]+)")];
        assert_eq!(extract_token(html, &patterns).as_deref(), Some("Q1w%3D"));
    }

    #[test]
    fn test_extract_token_none() {
        let patterns = [re(r"sesskey=([a-zA-Z0-9%=]+)")];
        assert_eq!(extract_token("<html>login</html>", &patterns), None);
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html><body>Login</body></html>"));
        assert!(looks_like_html("\n<!DOCTYPE HTML>\n<HTML lang=en>"));
        assert!(looks_like_html("<html><head></head></html>"));
        assert!(!looks_like_html(r#"{"sEcho":1,"aaData":[]}"#));
    }

    #[test]
    fn test_looks_like_html_after_long_preamble() {
        let mut body = "Notice: Undefined index: fg in data_smscdr.php on line 12<br>\n".repeat(100);
        assert!(body.len() > 4096);
        body.push_str("<!DOCTYPE HTML><HTML><body>Login</body></HTML>");
        assert!(looks_like_html(&body));
    }

    #[test]
    fn test_is_blocked() {
        let markers = vec!["Forbidden".to_string()];
        assert!(is_blocked(200, "<h1>403 Forbidden</h1>", &markers));
        assert!(is_blocked(403, "", &markers));
        assert!(!is_blocked(200, "What is 1 + 2 = ?", &markers));
    }

    #[test]
    fn test_bare_text() {
        assert_eq!(bare_text(" <b>12</b> SMS "), "12 SMS");
    }
}
