//! Front matter: a `---`-delimited `key: value` block at the top of the
//! document.
//!
//! The block is handed to serde_yaml, which gives exactly the inference the
//! format needs (booleans, integers, floats, quoted strings). A malformed
//! block is ignored rather than failing the parse.

use std::collections::BTreeMap;

use serde_yaml::Value;

/// Parsed front matter keys, in document order (BTreeMap keeps rendering
/// deterministic).
pub type FrontMatter = BTreeMap<String, Value>;

/// Split a document into its front matter block and body.
///
/// Returns `(front_matter, body_start_line)`. The front matter is empty when
/// the document has no leading `---` fence, the fence is unterminated, or
/// the block is not valid YAML.
pub fn parse_front_matter(lines: &[&str]) -> (FrontMatter, usize) {
    if lines.first().map(|l| l.trim()) != Some("---") {
        return (FrontMatter::new(), 0);
    }
    let Some(end) = lines[1..].iter().position(|l| l.trim() == "---") else {
        // Unterminated fence: treat the whole document as body.
        return (FrontMatter::new(), 0);
    };
    let end = end + 1;
    let block = lines[1..end].join("\n");
    match serde_yaml::from_str::<FrontMatter>(&block) {
        Ok(map) => (map, end + 1),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed front matter block");
            (FrontMatter::new(), end + 1)
        }
    }
}

/// Render a front matter block, or an empty string for an empty map.
pub fn render_front_matter(front: &FrontMatter) -> String {
    if front.is_empty() {
        return String::new();
    }
    let body = serde_yaml::to_string(front).unwrap_or_default();
    format!("---\n{body}---\n\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(doc: &str) -> Vec<&str> {
        doc.lines().collect()
    }

    #[test]
    fn absent_front_matter_yields_empty_map() {
        let (front, start) = parse_front_matter(&lines("## Tasks\n- [ ] a"));
        assert!(front.is_empty());
        assert_eq!(start, 0);
    }

    #[test]
    fn values_are_type_inferred() {
        let doc = "---\nproject: groceries\nautosync: true\nretries: 3\nweight: 0.5\nquoted: \"007\"\n---\nbody";
        let (front, start) = parse_front_matter(&lines(doc));
        assert_eq!(start, 7);
        assert_eq!(front["project"], Value::from("groceries"));
        assert_eq!(front["autosync"], Value::from(true));
        assert_eq!(front["retries"], Value::from(3));
        assert_eq!(front["weight"], Value::from(0.5));
        assert_eq!(front["quoted"], Value::from("007"), "quoting forces string");
    }

    #[test]
    fn unterminated_fence_is_treated_as_body() {
        let (front, start) = parse_front_matter(&lines("---\nkey: value\n## Tasks"));
        assert!(front.is_empty());
        assert_eq!(start, 0);
    }

    #[test]
    fn malformed_block_is_skipped_not_fatal() {
        let (front, start) = parse_front_matter(&lines("---\n{ not yaml ][\n---\nbody"));
        assert!(front.is_empty());
        assert_eq!(start, 3, "body still starts after the fence");
    }

    #[test]
    fn render_roundtrips_through_parse() {
        let mut front = FrontMatter::new();
        front.insert("autosync".to_string(), Value::from(true));
        front.insert("project".to_string(), Value::from("x"));

        let rendered = render_front_matter(&front);
        let (back, _) = parse_front_matter(&rendered.lines().collect::<Vec<_>>());
        assert_eq!(back, front);
    }

    #[test]
    fn empty_map_renders_nothing() {
        assert_eq!(render_front_matter(&FrontMatter::new()), "");
    }
}
