//! Content sanitizer for user-authored text.
//!
//! Titles, tags, and section names originate from a hand-edited file and
//! from app-side callers; both are untrusted. [`sanitize_text`] strips
//! script blocks, HTML-like tags, `javascript:` URIs, and control
//! characters before the text is rendered into the document or returned to
//! callers.

/// Strip markup and control characters, collapse whitespace, trim.
pub fn sanitize_text(input: &str) -> String {
    let without_scripts = strip_blocks(input, "<script", "</script>");
    let without_styles = strip_blocks(&without_scripts, "<style", "</style>");
    let without_tags = strip_tags(&without_styles);
    let without_uris = strip_scheme(&without_tags, "javascript:");

    let mut out = String::with_capacity(without_uris.len());
    let mut last_was_space = true;
    for ch in without_uris.chars() {
        let ch = if ch.is_control() || ch.is_whitespace() { ' ' } else { ch };
        if ch == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Remove every `open…close` block, case-insensitively. An unterminated
/// block is removed to the end of the input.
fn strip_blocks(input: &str, open: &str, close: &str) -> String {
    let lower = input.to_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(open) {
        let start = cursor + start;
        out.push_str(&input[cursor..start]);
        match lower[start..].find(close) {
            Some(end) => cursor = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&input[cursor..]);
    out
}

/// Remove `<...>` tag spans. A lone `<` with no closing `>` is kept as text.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remove every occurrence of `scheme` (case-insensitive).
fn strip_scheme(input: &str, scheme: &str) -> String {
    let lower = input.to_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(scheme) {
        let start = cursor + start;
        out.push_str(&input[cursor..start]);
        cursor = start + scheme.len();
    }
    out.push_str(&input[cursor..]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Buy milk")]
    #[case("Émile's café run #errand")]
    #[case("due by 2026-03-01, maybe")]
    fn plain_text_is_untouched(#[case] input: &str) {
        assert_eq!(sanitize_text(input), input);
    }

    #[rstest]
    #[case("before <script>alert('x')</script> after", "before after")]
    #[case("title <SCRIPT SRC=evil.js></SCRIPT>", "title")]
    #[case("<style>body{}</style>plain", "plain")]
    fn script_and_style_blocks_are_removed_entirely(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_text(input), expected);
    }

    #[test]
    fn unterminated_script_is_dropped_to_end() {
        assert_eq!(sanitize_text("ok <script>alert('x')"), "ok");
    }

    #[test]
    fn html_tags_are_stripped_but_content_kept() {
        assert_eq!(sanitize_text("<b>Ship</b> the <i>release</i>"), "Ship the release");
    }

    #[test]
    fn javascript_uris_are_removed() {
        assert_eq!(sanitize_text("click javascript:alert(1) here"), "click alert(1) here");
    }

    #[test]
    fn control_characters_collapse_to_spaces() {
        assert_eq!(sanitize_text("line\u{0}one\ttwo\r\nthree"), "line one two three");
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        assert_eq!(sanitize_text("  spaced   out  "), "spaced out");
    }
}
