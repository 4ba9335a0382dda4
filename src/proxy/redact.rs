//! Secret redaction for diagnostic output
//!
//! Everything destined for the diagnostic sink passes through [`redact`]
//! before it is emitted: header dumps, body snippets, anything derived from
//! wire data. Two independent layers:
//!
//! 1. Exact replacement of the configured API key, wherever it appears.
//! 2. A generic sweep over `Bearer <token>` patterns, which also catches
//!    client-supplied tokens the configuration never saw.

use crate::proxy::headers::BEARER_PREFIX;

/// Placeholder substituted for any redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Scrub `secret` and any bearer token from `text`.
///
/// The exact-secret pass runs first (skipped when `secret` is empty); the
/// bearer sweep always runs. The two layers are deliberately independent --
/// the sweep must not rely on knowing the secret.
pub fn redact(secret: &str, text: &str) -> String {
    let scrubbed = if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, REDACTED)
    };

    if scrubbed.contains(BEARER_PREFIX) {
        sweep_bearer_tokens(&scrubbed)
    } else {
        scrubbed
    }
}

/// Replace the run of non-whitespace characters after every `Bearer ` with
/// the placeholder. Whitespace (and anything after it) is preserved.
fn sweep_bearer_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find(BEARER_PREFIX) {
        let token_start = idx + BEARER_PREFIX.len();
        out.push_str(&rest[..token_start]);

        let tail = &rest[token_start..];
        let token_end = tail
            .find(|c: char| c.is_whitespace())
            .unwrap_or(tail.len());
        out.push_str(REDACTED);
        rest = &tail[token_end..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_secret_is_replaced_everywhere() {
        let out = redact("s3cret", "key=s3cret other=s3cret done");
        assert!(!out.contains("s3cret"));
        assert_eq!(out, "key=[REDACTED] other=[REDACTED] done");
    }

    #[test]
    fn bearer_tokens_are_swept_without_knowing_the_secret() {
        let out = redact("", "Authorization: Bearer abc.def-123 trailing");
        assert_eq!(out, "Authorization: Bearer [REDACTED] trailing");
    }

    #[test]
    fn bearer_token_at_end_of_input() {
        let out = redact("", "Bearer tail-token");
        assert_eq!(out, "Bearer [REDACTED]");
    }

    #[test]
    fn multiple_bearer_tokens() {
        let out = redact("", "a Bearer one b Bearer two c");
        assert_eq!(out, "a Bearer [REDACTED] b Bearer [REDACTED] c");
    }

    #[test]
    fn secret_inside_bearer_header_is_doubly_covered() {
        let out = redact("topsecret", "Authorization: Bearer topsecret\nnext");
        assert!(!out.contains("topsecret"));
        assert_eq!(out, "Authorization: Bearer [REDACTED]\nnext");
    }

    #[test]
    fn empty_secret_leaves_plain_text_alone() {
        assert_eq!(redact("", "nothing sensitive here"), "nothing sensitive here");
    }

    #[test]
    fn secret_in_json_body_is_scrubbed() {
        let out = redact("k-123", r#"{"api_key":"k-123","user":"bob"}"#);
        assert_eq!(out, r#"{"api_key":"[REDACTED]","user":"bob"}"#);
    }
}
