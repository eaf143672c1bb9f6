//! Removal of inline secret material from sidecar admin responses.

use std::sync::LazyLock;

use regex::Regex;

/// Text written in place of every redacted line.
pub const REDACTED: &str = "---redacted---";

/// Envoy config dumps embed certificates and keys under these keys.
/// The line body stops short of `\r` so CRLF endings survive.
const SECRET_MARKERS: &str = r"(?m)^[^\r\n]*(inline_bytes|inline_string)[^\r\n]*";

static SECRETS: LazyLock<RedactionRule> = LazyLock::new(|| RedactionRule {
    pattern: Regex::new(SECRET_MARKERS).expect("secret marker pattern is valid"),
    placeholder: REDACTED,
});

/// Line-level pattern whose matches are replaced before persisting.
#[derive(Debug)]
pub struct RedactionRule {
    pattern: Regex,
    placeholder: &'static str,
}

impl RedactionRule {
    /// The fixed rule applied to every probe response.
    pub fn secrets() -> &'static RedactionRule {
        &SECRETS
    }

    /// Returns a copy of `body` with every matching line replaced.
    ///
    /// Line endings and non-matching lines are preserved byte for byte.
    pub fn apply(&self, body: &str) -> String {
        self.pattern
            .replace_all(body, self.placeholder)
            .into_owned()
    }
}

/// Applies the secret redaction rule to `body`.
pub fn redact(body: &str) -> String {
    RedactionRule::secrets().apply(body)
}
