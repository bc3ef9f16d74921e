//! Secret redaction for anything that leaves the gateway: error messages, audit log
//! lines, and classified backend errors.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

pub const REDACTED: &str = "[REDACTED]";

static SK_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[A-Za-z0-9_\-]{16,}").expect("static regex"));

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9+/=._\-]+").expect("static regex"));

static API_KEY_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(api[-_]?key["']?\s*[:=]\s*["']?)[A-Za-z0-9+/=._\-]+"#)
        .expect("static regex")
});

static HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{24,}\b").expect("static regex"));

static BASE64ISH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{24,}={0,2}").expect("static regex"));

/// Replace anything that looks like a credential with `[REDACTED]`.
///
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_message(message: &str) -> String {
    let out = SK_KEY.replace_all(message, REDACTED);
    let out = BEARER.replace_all(&out, |caps: &Captures| format!("{}{REDACTED}", &caps[1]));
    let out = API_KEY_PAIR.replace_all(&out, |caps: &Captures| format!("{}{REDACTED}", &caps[1]));
    let out = HEX.replace_all(&out, REDACTED);
    let out = BASE64ISH.replace_all(&out, |caps: &Captures| {
        let candidate = &caps[0];
        if looks_encoded(candidate) {
            REDACTED.to_string()
        } else {
            candidate.to_string()
        }
    });
    out.into_owned()
}

/// Long plain words and CamelCase codes (`ResponsibleAIPolicyViolation`) are left
/// alone. A run counts as encoded when it carries `+`, `/`, `=` or a digit, or when
/// at least a quarter of its letters after the first are uppercase among lowercase.
fn looks_encoded(run: &str) -> bool {
    let bytes = run.as_bytes();
    if bytes.iter().any(|b| matches!(b, b'+' | b'/' | b'=') || b.is_ascii_digit()) {
        return true;
    }
    let inner_upper = bytes.iter().skip(1).filter(|b| b.is_ascii_uppercase()).count();
    let has_lower = bytes.iter().any(u8::is_ascii_lowercase);
    has_lower && inner_upper * 4 >= bytes.len()
}
