//! Response body decoding for the Admin API client.

use anyhow::anyhow;
use serde::de::DeserializeOwned;

/// Characters of the offending line shown on either side of a parse error.
const EXCERPT_RADIUS: usize = 24;

/// Decode a response body, naming the JSON path and quoting the offending
/// part of the body when it does not parse.
pub fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> anyhow::Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let excerpt = excerpt(body, inner.line(), inner.column());
        match path.as_str() {
            "" | "." => anyhow!("{inner}: `{excerpt}`"),
            _ => anyhow!("at `{path}`: {inner}: `{excerpt}`"),
        }
    })
}

/// The text around 1-based `line`/`column`, clipped to char boundaries.
fn excerpt(body: &str, line: usize, column: usize) -> &str {
    let text = body.lines().nth(line.saturating_sub(1)).unwrap_or_default();
    let at = column.saturating_sub(1).min(text.len());
    let mut start = at.saturating_sub(EXCERPT_RADIUS);
    let mut end = (at + EXCERPT_RADIUS).min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::Value;

    #[test]
    fn mistyped_field_names_its_path() {
        #[derive(Debug, Deserialize)]
        struct Page {
            #[allow(dead_code)]
            data: Connection,
        }

        #[derive(Debug, Deserialize)]
        struct Connection {
            #[allow(dead_code)]
            products: Vec<String>,
        }

        let err = parse_json_with_context::<Page>(r#"{"data": {"products": [7]}}"#)
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("at `data.products[0]`: invalid type"), "{err}");
    }

    #[test]
    fn html_error_page_is_quoted() {
        let err = parse_json_with_context::<Value>("<html>502</html>")
            .unwrap_err()
            .to_string();
        assert!(err.contains("line 1 column 1"), "{err}");
        assert!(err.ends_with("`<html>502</html>`"), "{err}");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let line = format!("{}é{}", "a".repeat(30), "b".repeat(30));
        let clipped = excerpt(&line, 1, 56);
        assert!(clipped.ends_with('b'));
        assert!(clipped.len() <= 2 * EXCERPT_RADIUS + 1);
        assert_eq!(excerpt("", 3, 10), "");
    }
}
