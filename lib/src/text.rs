//! Text form of the metadata graph: one JSON-encoded quad per line.
//!
//! The container stores its metadata in a single segment using this form.
//! Blank lines are ignored when parsing.

use crate::errors::Aff4Error;
use crate::quadstore::{Quad, QuadStore};
use crate::Result;

/// Serialize quads, one per line, each line terminated by `\n`.
pub fn serialize<'a>(quads: impl IntoIterator<Item = &'a Quad>) -> Result<String> {
    let mut out = String::new();
    for (i, quad) in quads.into_iter().enumerate() {
        let line = serde_json::to_string(quad)
            .map_err(|source| Aff4Error::Metadata { line: i + 1, source })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Parse the text form. Line numbers in errors are 1-based.
pub fn parse(text: &str) -> Result<Vec<Quad>> {
    let mut quads = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let quad = serde_json::from_str(line)
            .map_err(|source| Aff4Error::Metadata { line: i + 1, source })?;
        quads.push(quad);
    }
    Ok(quads)
}

/// Parse straight into a fresh store.
pub fn parse_store(text: &str) -> Result<QuadStore> {
    Ok(parse(text)?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Object;

    #[test]
    fn lines_are_independent_json() {
        let mut s = QuadStore::new();
        s.insert("g", "s", "p", Object::typed("5", "dt"));
        s.insert("g", "s", "q", Object::resource("o"));
        let text = serialize(s.iter()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().contains("\"datatype\":\"dt\""));
        let back = parse(&format!("\n{text}\n\n")).unwrap();
        assert_eq!(back, s.iter().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn reports_bad_line() {
        let err = parse("\n{\"graph\":1}\n").unwrap_err();
        assert!(matches!(err, Aff4Error::Metadata { line: 2, .. }));
    }
}
